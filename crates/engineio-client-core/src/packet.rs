use std::{fmt, time::Duration};

use base64::{Engine, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Str;

/// A packet exchanged with the server over any transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Open packet, sent by the server to initiate the session.
    /// Carries the [`OpenPacket`] handshake record as JSON.
    Open(OpenPacket),
    /// Close packet, sent by either side to terminate the session.
    Close,
    /// Ping packet. The payload is usually empty; during the transport
    /// upgrade the client probes the new transport with a `"probe"` payload.
    Ping(Str),
    /// Pong packet answering a [`Packet::Ping`], echoing its payload.
    Pong(Str),
    /// String message packet. The payload is opaque to the session layer.
    Message(Str),
    /// Binary message packet.
    ///
    /// Encoded as a base64 string with a `b4` prefix on the polling
    /// transport and as a binary frame on the websocket transport.
    Binary(Bytes),
    /// Upgrade packet, sent by the client to commit the transport upgrade.
    Upgrade,
    /// Noop packet, used to release a pending polling request.
    Noop,
}

impl Packet {
    /// Get the max size the packet could have when serialized.
    ///
    /// The base64 max size factor is `ceil(n / 3) * 4`.
    pub fn get_size_hint(&self) -> usize {
        match self {
            Packet::Open(_) => 156,
            Packet::Close | Packet::Upgrade | Packet::Noop => 1,
            Packet::Ping(payload) | Packet::Pong(payload) => 1 + payload.len(),
            Packet::Message(msg) => 1 + msg.len(),
            Packet::Binary(data) => {
                2 + base64::encoded_len(data.len(), true).unwrap_or(usize::MAX - 2)
            }
        }
    }
}

/// Serialize a [`Packet`] to a [`String`] according to the engine.io protocol.
impl From<Packet> for String {
    fn from(packet: Packet) -> String {
        let mut buffer = String::with_capacity(packet.get_size_hint());
        match packet {
            Packet::Open(open) => {
                buffer.push('0');
                buffer.push_str(&serde_json::to_string(&open).unwrap());
            }
            Packet::Close => buffer.push('1'),
            Packet::Ping(payload) => {
                buffer.push('2');
                buffer.push_str(&payload);
            }
            Packet::Pong(payload) => {
                buffer.push('3');
                buffer.push_str(&payload);
            }
            Packet::Message(msg) => {
                buffer.push('4');
                buffer.push_str(&msg);
            }
            Packet::Upgrade => buffer.push('5'),
            Packet::Noop => buffer.push('6'),
            Packet::Binary(data) => {
                buffer.push_str("b4");
                general_purpose::STANDARD.encode_string(data, &mut buffer);
            }
        };
        buffer
    }
}

/// Deserialize a [`Packet`] from a [`Str`] according to the engine.io protocol.
impl TryFrom<Str> for Packet {
    type Error = PacketParseError;
    fn try_from(value: Str) -> Result<Self, Self::Error> {
        let packet_type = value
            .as_bytes()
            .first()
            .ok_or(PacketParseError::InvalidPacketType(None))?;
        let res = match packet_type {
            b'0' => Packet::Open(serde_json::from_str(value.slice(1..).as_str())?),
            b'1' => Packet::Close,
            b'2' => Packet::Ping(value.slice(1..)),
            b'3' => Packet::Pong(value.slice(1..)),
            b'4' => Packet::Message(value.slice(1..)),
            b'5' => Packet::Upgrade,
            b'6' => Packet::Noop,
            // b64 binary packets carry the message type as a second prefix char
            b'b' if value.as_bytes().get(1) == Some(&b'4') => Packet::Binary(
                general_purpose::STANDARD
                    .decode(value.slice(2..).as_bytes())?
                    .into(),
            ),
            b'b' => Packet::Binary(
                general_purpose::STANDARD
                    .decode(value.slice(1..).as_bytes())?
                    .into(),
            ),
            c => Err(PacketParseError::InvalidPacketType(Some(*c as char)))?,
        };
        Ok(res)
    }
}

impl TryFrom<String> for Packet {
    type Error = PacketParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Packet::try_from(Str::from(value))
    }
}

/// An error that occurs when parsing a packet or a payload.
#[derive(Debug)]
pub enum PacketParseError {
    /// The open packet JSON record is invalid.
    InvalidOpenPacket(serde_json::Error),
    /// The packet type prefix is invalid.
    InvalidPacketType(Option<char>),
    /// A payload frame length is invalid.
    InvalidPacketLen,
    /// The payload is not valid UTF-8.
    InvalidUtf8(std::str::Utf8Error),
    /// The base64 decoding of a binary packet failed.
    Base64Decode(base64::DecodeError),
}

impl fmt::Display for PacketParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketParseError::InvalidOpenPacket(e) => write!(f, "invalid open packet: {e}"),
            PacketParseError::InvalidPacketType(c) => write!(f, "invalid packet type: {c:?}"),
            PacketParseError::InvalidPacketLen => write!(f, "invalid packet length"),
            PacketParseError::InvalidUtf8(err) => {
                write!(f, "invalid utf8 when parsing payload into packets: {err}")
            }
            PacketParseError::Base64Decode(err) => write!(f, "base64 decode error: {err}"),
        }
    }
}
impl From<base64::DecodeError> for PacketParseError {
    fn from(err: base64::DecodeError) -> Self {
        PacketParseError::Base64Decode(err)
    }
}
impl From<std::str::Utf8Error> for PacketParseError {
    fn from(err: std::str::Utf8Error) -> Self {
        PacketParseError::InvalidUtf8(err)
    }
}
impl From<serde_json::Error> for PacketParseError {
    fn from(err: serde_json::Error) -> Self {
        PacketParseError::InvalidOpenPacket(err)
    }
}
impl std::error::Error for PacketParseError {}

/// The handshake record carried by the [`Packet::Open`] packet.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    /// The server-assigned session id, opaque to the client.
    pub sid: Str,
    /// The transports the server accepts an upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// The heartbeat interval as a raw integer count of milliseconds.
    /// Defaults to 25 seconds when the server omits it.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// The heartbeat timeout as a raw integer count of milliseconds.
    /// Defaults to 60 seconds when the server omits it.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25000
}
fn default_ping_timeout() -> u64 {
    60000
}

impl OpenPacket {
    /// The heartbeat interval as a [`Duration`].
    ///
    /// The JSON field is a raw millisecond count, scaled to nanoseconds here.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_nanos(self.ping_interval.saturating_mul(1_000_000))
    }

    /// The heartbeat timeout as a [`Duration`].
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_nanos(self.ping_timeout.saturating_mul(1_000_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_packet_deserialize() {
        let ref_packet = OpenPacket {
            sid: "AA9AAA0AAzAAAAHs".into(),
            upgrades: vec!["websocket".to_string()],
            ping_interval: 25000,
            ping_timeout: 60000,
        };
        let packet_str = "0{\"sid\":\"AA9AAA0AAzAAAAHs\",\"upgrades\":[\"websocket\"],\
             \"pingInterval\":25000,\"pingTimeout\":60000}"
            .to_string();
        let packet = Packet::try_from(packet_str).unwrap();
        assert!(matches!(packet, Packet::Open(p) if p == ref_packet));
    }

    #[test]
    fn open_packet_ignores_extra_fields() {
        let packet_str = "0{\"sid\":\"abc\",\"upgrades\":[],\"pingInterval\":25000,\
             \"pingTimeout\":60000,\"maxPayload\":100000}"
            .to_string();
        let packet = Packet::try_from(packet_str).unwrap();
        assert!(matches!(packet, Packet::Open(p) if p.sid == "abc"));
    }

    #[test]
    fn open_packet_durations_scale_milliseconds() {
        let open = OpenPacket {
            sid: "abc".into(),
            upgrades: vec![],
            ping_interval: 25000,
            ping_timeout: 60000,
        };
        assert_eq!(open.ping_interval(), Duration::from_secs(25));
        assert_eq!(open.ping_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn open_packet_defaults_missing_heartbeat_fields() {
        let packet = Packet::try_from("0{\"sid\":\"abc\"}".to_string()).unwrap();
        let Packet::Open(open) = packet else {
            panic!("expected an open packet")
        };
        assert_eq!(open.ping_interval(), Duration::from_secs(25));
        assert_eq!(open.ping_timeout(), Duration::from_secs(60));
        assert!(open.upgrades.is_empty());
    }

    #[test]
    fn message_packet() {
        let packet = Packet::Message("hello".into());
        let packet_str: String = packet.into();
        assert_eq!(packet_str, "4hello");

        let packet: Packet = "4hello".to_string().try_into().unwrap();
        assert_eq!(packet, Packet::Message("hello".into()));
    }

    #[test]
    fn ping_pong_packets_carry_payload() {
        let packet: String = Packet::Ping("probe".into()).into();
        assert_eq!(packet, "2probe");
        let packet: String = Packet::Pong("".into()).into();
        assert_eq!(packet, "3");

        let packet: Packet = "3probe".to_string().try_into().unwrap();
        assert_eq!(packet, Packet::Pong("probe".into()));
        let packet: Packet = "2".to_string().try_into().unwrap();
        assert_eq!(packet, Packet::Ping("".into()));
    }

    #[test]
    fn binary_packet() {
        let packet = Packet::Binary(vec![1, 2, 3].into());
        let packet_str: String = packet.into();
        assert_eq!(packet_str, "b4AQID");

        let packet: Packet = "b4AQID".to_string().try_into().unwrap();
        assert_eq!(packet, Packet::Binary(vec![1, 2, 3].into()));
        let packet: Packet = "bAQID".to_string().try_into().unwrap();
        assert_eq!(packet, Packet::Binary(vec![1, 2, 3].into()));
    }

    #[test]
    fn control_packets() {
        for (packet, repr) in [
            (Packet::Close, "1"),
            (Packet::Upgrade, "5"),
            (Packet::Noop, "6"),
        ] {
            let packet_str: String = packet.clone().into();
            assert_eq!(packet_str, repr);
            let decoded: Packet = repr.to_string().try_into().unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn invalid_packet_type() {
        let err = Packet::try_from("9nope".to_string()).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketType(Some('9'))));
        let err = Packet::try_from(String::new()).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketType(None)));
    }
}
