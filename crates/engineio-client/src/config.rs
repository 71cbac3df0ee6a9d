//! Session configuration, built with [`SessionConfig::builder`].

use std::time::Duration;

use engineio_client_core::TransportType;
use http::{HeaderMap, HeaderName, HeaderValue};

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The transports the session may use, in order of preference.
    /// Defaults to `[websocket, polling]`: open over polling, then upgrade.
    pub transports: Vec<TransportType>,

    /// Extra query parameters appended to every request URL.
    ///
    /// The `EIO` protocol version parameter defaults to `3` and can be
    /// overridden here.
    pub query: Vec<(String, String)>,

    /// Http headers forwarded verbatim on every request.
    pub headers: HeaderMap,

    /// How many times a send re-checks the session state while a transport
    /// upgrade is in flight before failing with
    /// [`Error::Upgrading`](crate::Error::Upgrading). Defaults to 30.
    pub upgrade_retries: usize,

    /// The pause between two upgrade re-checks. Defaults to 50 ms.
    pub upgrade_retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transports: vec![TransportType::Websocket, TransportType::Polling],
            query: Vec::new(),
            headers: HeaderMap::new(),
            upgrade_retries: 30,
            upgrade_retry_delay: Duration::from_millis(50),
        }
    }
}

impl SessionConfig {
    /// Create a new [`SessionConfigBuilder`] with default values.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    /// The transports the session may use, in order of preference.
    pub fn transports(mut self, transports: impl IntoIterator<Item = TransportType>) -> Self {
        self.config.transports = transports.into_iter().collect();
        self
    }

    /// Append a query parameter to every request URL.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.query.push((key.into(), value.into()));
        self
    }

    /// Add an http header forwarded on every request.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    /// The bound of the send-while-upgrading retry loop.
    pub fn upgrade_retries(mut self, upgrade_retries: usize) -> Self {
        self.config.upgrade_retries = upgrade_retries;
        self
    }

    /// The pause between two upgrade re-checks.
    pub fn upgrade_retry_delay(mut self, upgrade_retry_delay: Duration) -> Self {
        self.config.upgrade_retry_delay = upgrade_retry_delay;
        self
    }

    /// Build the config.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
