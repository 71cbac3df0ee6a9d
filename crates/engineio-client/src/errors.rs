use engineio_client_core::PacketParseError;

use crate::transport::TransportError;

/// All errors that the session surfaces to the caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration names an unknown transport or an unsupported
    /// combination of transports.
    #[error("invalid transport configuration")]
    InvalidTransport,
    /// The session URL scheme is not `http` or `https`.
    #[error("the session url scheme must be http or https")]
    InvalidScheme,
    /// The first packet received during the handshake was not an open packet.
    #[error("handshake failed: expected an open packet")]
    BadHandshake,
    /// A packet could not be parsed during the handshake.
    #[error("error parsing packet: {0}")]
    PacketParse(#[from] PacketParseError),
    /// A send was attempted while the transport upgrade was still in flight
    /// and did not settle within the configured retry window.
    /// The caller may retry.
    #[error("transport upgrade in progress")]
    Upgrading,
    /// The session is closed. Terminal.
    #[error("session closed")]
    Closed,
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The session URL could not be parsed.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// An http request could not be built from the session URL.
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    /// A text message payload was not valid UTF-8.
    #[error("message payload is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
