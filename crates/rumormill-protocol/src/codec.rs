//! CBOR wire codec.
//!
//! Packets are encoded as CBOR maps with the field names as keys.
//! Decoding ignores unknown fields and treats missing optional fields
//! as absent, so old nodes interoperate with newer packet layouts.
//! A datagram that fails to decode is simply dropped by the caller.

use rumormill_types::{Result, RumormillError};

use crate::packet::GossipPacket;

/// Maximum size of an encoded datagram (UDP limit).
pub const MAX_DATAGRAM: usize = 65536;

/// Encodes a packet for transmission.
///
/// # Errors
///
/// Returns [`RumormillError::ProtocolError`] if serialization fails or
/// the encoded packet exceeds [`MAX_DATAGRAM`].
pub fn encode(packet: &GossipPacket) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(packet, &mut buf).map_err(|e| RumormillError::ProtocolError {
        reason: format!("packet encoding failed: {e}"),
    })?;
    if buf.len() > MAX_DATAGRAM {
        return Err(RumormillError::ProtocolError {
            reason: format!("encoded packet is {} bytes (max {MAX_DATAGRAM})", buf.len()),
        });
    }
    Ok(buf)
}

/// Decodes a received datagram.
///
/// # Errors
///
/// Returns [`RumormillError::ProtocolError`] on malformed input.
pub fn decode(data: &[u8]) -> Result<GossipPacket> {
    ciborium::from_reader(data).map_err(|e| RumormillError::ProtocolError {
        reason: format!("packet decoding failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PeerStatus, StatusPacket};
    use crate::rumor::{RumorMessage, NONCE_LEN};

    #[test]
    fn status_roundtrip() -> Result<()> {
        let packet = GossipPacket::status(StatusPacket {
            want: vec![PeerStatus {
                identifier: "abcdefgh22334455".into(),
                next_id: 7,
            }],
        });
        let decoded = decode(&encode(&packet)?)?;
        assert_eq!(packet.status, decoded.status);
        assert!(decoded.rumor.is_none());
        Ok(())
    }

    #[test]
    fn rumor_roundtrip_preserves_previous_hop() -> Result<()> {
        let packet = GossipPacket::rumor(RumorMessage {
            origin: "abcdefgh22334455".into(),
            destination: String::new(),
            id: 3,
            content: b"payload".to_vec(),
            signature: vec![0xAB; 64],
            nonce: vec![0x01; NONCE_LEN],
            previous_hop: Some("192.168.1.5:5000".into()),
        });
        let decoded = decode(&encode(&packet)?)?;
        assert_eq!(packet.rumor, decoded.rumor);
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"\xFF\xFF\xFF not cbor").is_err());
    }

    #[test]
    fn empty_datagram_is_rejected() {
        assert!(decode(b"").is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() -> Result<()> {
        // A future packet kind alongside a status field.
        let value = ciborium::Value::Map(vec![
            (
                ciborium::Value::Text("status".into()),
                ciborium::Value::Map(vec![(
                    ciborium::Value::Text("want".into()),
                    ciborium::Value::Array(vec![]),
                )]),
            ),
            (
                ciborium::Value::Text("hologram".into()),
                ciborium::Value::Integer(42.into()),
            ),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&value, &mut buf).expect("encode test value");
        let decoded = decode(&buf)?;
        assert!(decoded.status.is_some());
        Ok(())
    }
}
