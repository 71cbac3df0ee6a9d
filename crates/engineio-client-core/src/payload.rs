//! ## Codec for http-polling payloads
//!
//! A polling payload concatenates packets as `<length>:<packet>` frames,
//! where the length is a count of *characters*, not bytes
//! ([engine.io v3 protocol](https://github.com/socketio/engine.io-protocol/tree/v3#payload)).

use crate::{Packet, PacketParseError, Str};

/// Append one packet to a string payload.
pub fn encode_packet(packet: Packet, data: &mut String) {
    let packet: String = packet.into();
    data.push_str(&packet.chars().count().to_string());
    data.push(':');
    data.push_str(&packet);
}

/// Encode a sequence of packets into a single payload.
pub fn encode(packets: impl IntoIterator<Item = Packet>) -> String {
    let mut data = String::new();
    for packet in packets {
        encode_packet(packet, &mut data);
    }
    data
}

/// Decode a full payload body into its packets.
pub fn decode(payload: Str) -> Result<Vec<Packet>, PacketParseError> {
    let mut packets = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let sep = rest.find(':').ok_or(PacketParseError::InvalidPacketLen)?;
        let char_len: usize = rest[..sep]
            .parse()
            .map_err(|_| PacketParseError::InvalidPacketLen)?;
        let body = rest.slice(sep + 1..);

        // Map the character count to a byte length within this frame
        let byte_len = match body.char_indices().nth(char_len) {
            Some((i, _)) => i,
            None if body.chars().count() == char_len => body.len(),
            None => return Err(PacketParseError::InvalidPacketLen),
        };

        packets.push(Packet::try_from(body.slice(..byte_len))?);
        rest = body.slice(byte_len..);
    }
    Ok(packets)
}
