use std::{fmt, str::FromStr};

/// The type of transport used to reach the server.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// HTTP long-polling transport
    Polling,
    /// Websocket transport
    Websocket,
}

impl TransportType {
    /// The name of the transport as it appears in the `transport` query parameter.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportType::Polling => "polling",
            TransportType::Websocket => "websocket",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configuration names a transport that does not exist.
#[derive(Debug, Copy, Clone)]
pub struct UnknownTransportError;
impl fmt::Display for UnknownTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transport type")
    }
}
impl std::error::Error for UnknownTransportError {}

impl FromStr for TransportType {
    type Err = UnknownTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(TransportType::Polling),
            "websocket" => Ok(TransportType::Websocket),
            _ => Err(UnknownTransportError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_transports() {
        assert_eq!("polling".parse::<TransportType>().unwrap(), TransportType::Polling);
        assert_eq!(
            "websocket".parse::<TransportType>().unwrap(),
            TransportType::Websocket
        );
        assert!("webtransport".parse::<TransportType>().is_err());
    }
}
