//! The transport capability consumed by the session.
//!
//! A transport moves whole packets: it guarantees that the bytes of one
//! packet are contiguous on the wire, while ordering *across* packets is the
//! session's business. A receive error is terminal for the transport
//! instance.

use engineio_client_core::{Packet, PacketParseError, TransportType};
use http::{HeaderMap, StatusCode};
use tokio_tungstenite::tungstenite;
use url::Url;

pub(crate) mod polling;
pub(crate) mod ws;

use polling::PollingTransport;
use ws::WsTransport;

/// The prepared request every transport request is derived from:
/// the full URL (scheme, path and query) plus caller-supplied headers.
#[derive(Debug, Clone)]
pub(crate) struct RequestTemplate {
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
}

/// An error raised by a concrete transport.
///
/// Never reaches the caller directly: read failures collapse the session to
/// its closed state and handshake failures are wrapped by
/// [`Error`](crate::Error).
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// Websocket transport error.
    #[error("ws transport error: {0}")]
    Ws(#[from] Box<tungstenite::Error>),
    /// The http request could not be performed.
    #[error("http client error: {0}")]
    HttpClient(#[from] hyper_util::client::legacy::Error),
    /// The http response body could not be read.
    #[error("http body error: {0}")]
    Body(#[from] hyper::Error),
    /// The http request could not be built.
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    /// The server answered a polling request with an unexpected status.
    #[error("unexpected http status: {0}")]
    BadStatus(StatusCode),
    /// A received packet or payload could not be decoded.
    #[error("error decoding packet: {0}")]
    PacketParse(#[from] PacketParseError),
    /// The transport is closed.
    #[error("transport closed")]
    Closed,
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        TransportError::Ws(Box::new(err))
    }
}

/// A concrete transport bound to a prepared request.
#[derive(Debug)]
pub(crate) enum Transport {
    Polling(PollingTransport),
    Websocket(WsTransport),
}

impl Transport {
    /// Build a transport of the given type from a prepared request.
    ///
    /// The polling transport issues its first request lazily on the first
    /// [`recv`](Transport::recv); the websocket transport performs its
    /// protocol handshake here.
    pub(crate) async fn connect(
        kind: TransportType,
        req: &RequestTemplate,
    ) -> Result<Self, TransportError> {
        match kind {
            TransportType::Polling => Ok(Transport::Polling(PollingTransport::new(req))),
            TransportType::Websocket => Ok(Transport::Websocket(WsTransport::connect(req).await?)),
        }
    }

    pub(crate) fn kind(&self) -> TransportType {
        match self {
            Transport::Polling(_) => TransportType::Polling,
            Transport::Websocket(_) => TransportType::Websocket,
        }
    }

    /// Receive the next packet. Blocks until a packet is available;
    /// an error is terminal for this transport instance.
    pub(crate) async fn recv(&self) -> Result<Packet, TransportError> {
        match self {
            Transport::Polling(t) => t.recv().await,
            Transport::Websocket(t) => t.recv().await,
        }
    }

    /// Send one packet. The packet is flushed before this returns.
    pub(crate) async fn send(&self, packet: Packet) -> Result<(), TransportError> {
        match self {
            Transport::Polling(t) => t.send(packet).await,
            Transport::Websocket(t) => t.send(packet).await,
        }
    }

    /// Bind the server-assigned session id for subsequent requests.
    /// Only meaningful for polling; the websocket URL carries its id from
    /// the start.
    pub(crate) fn bind_sid(&self, sid: &str) {
        if let Transport::Polling(t) = self {
            t.bind_sid(sid);
        }
    }

    /// Close the transport. Pending and future receives fail.
    pub(crate) async fn close(&self) {
        match self {
            Transport::Polling(t) => t.close(),
            Transport::Websocket(t) => t.close().await,
        }
    }
}
