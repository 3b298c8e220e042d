//! The rumor message: the unit of gossip.
//!
//! Every rumor carries a per-origin sequence number, a signature over
//! its payload and a proof-of-work nonce. `id = 0` is reserved for the
//! origin's key announcement, whose content is the serialised public
//! key and whose signature is empty (the self-certifying name
//! suffices).

use rumormill_crypto::hash::{leading_zero_bits, sha256};
use rumormill_types::{DisplayName, Result, RumormillError};
use serde::{Deserialize, Serialize};

/// Byte length of the proof-of-work nonce.
pub const NONCE_LEN: usize = 16;

/// Byte length of a rumor signature (`id > 0` only).
pub const SIGNATURE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// RumorMessage
// ---------------------------------------------------------------------------

/// A message being gossiped through the network.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RumorMessage {
    /// Display name of the producer.
    pub origin: String,
    /// Empty for public messages, otherwise the recipient's name.
    /// Private content is encrypted to the recipient's announced key.
    #[serde(default)]
    pub destination: String,
    /// Per-origin sequence number; `0` is the key announcement.
    pub id: u32,
    /// Opaque payload bytes.
    #[serde(default)]
    pub content: Vec<u8>,
    /// Ed25519 signature over [`Self::payload`]; empty for `id == 0`.
    #[serde(default)]
    pub signature: Vec<u8>,
    /// 16-byte proof-of-work nonce.
    pub nonce: Vec<u8>,
    /// Previous-hop hint (`ip:port`): the address the forwarding peer
    /// received this rumor from. Empty/absent when the rumor comes
    /// straight from its origin. Not covered by hash or signature —
    /// it is rewritten at every hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hop: Option<String>,
}

impl RumorMessage {
    /// True if this is a route announcement (empty content, no
    /// destination).
    pub fn is_route_message(&self) -> bool {
        self.content.is_empty() && self.destination.is_empty() && self.id > 0
    }

    /// SHA-256 over all authenticated fields:
    /// `origin || destination || id(le) || content || signature || nonce`.
    ///
    /// The previous-hop hint is deliberately excluded — it changes at
    /// every hop.
    pub fn compute_hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(
            self.origin.len()
                + self.destination.len()
                + 4
                + self.content.len()
                + self.signature.len()
                + self.nonce.len(),
        );
        buf.extend_from_slice(self.origin.as_bytes());
        buf.extend_from_slice(self.destination.as_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.content);
        buf.extend_from_slice(&self.signature);
        buf.extend_from_slice(&self.nonce);
        sha256(&buf)
    }

    /// The signed portion of the message:
    /// `origin || destination || id(le) || content`.
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            self.origin.len() + self.destination.len() + 4 + self.content.len(),
        );
        buf.extend_from_slice(self.origin.as_bytes());
        buf.extend_from_slice(self.destination.as_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.content);
        buf
    }

    /// Structural sanity check: field lengths, Base32 names, nonce
    /// difficulty.
    ///
    /// # Errors
    ///
    /// Returns [`RumormillError::InvalidMessage`] naming the first
    /// failed check.
    pub fn sanity_check(&self, pow_target: u32) -> Result<()> {
        if !DisplayName::is_valid(&self.origin) {
            return Err(RumormillError::InvalidMessage {
                reason: "invalid origin name".into(),
            });
        }
        if !self.destination.is_empty() && !DisplayName::is_valid(&self.destination) {
            return Err(RumormillError::InvalidMessage {
                reason: "invalid destination name".into(),
            });
        }
        if self.nonce.len() != NONCE_LEN {
            return Err(RumormillError::InvalidMessage {
                reason: format!("nonce must be {NONCE_LEN} bytes, got {}", self.nonce.len()),
            });
        }
        if self.id == 0 {
            if !self.signature.is_empty() {
                return Err(RumormillError::InvalidMessage {
                    reason: "key announcement must carry an empty signature".into(),
                });
            }
        } else if self.signature.len() != SIGNATURE_LEN {
            return Err(RumormillError::InvalidMessage {
                reason: format!(
                    "signature must be {SIGNATURE_LEN} bytes, got {}",
                    self.signature.len(),
                ),
            });
        }
        if leading_zero_bits(&self.compute_hash()) < pow_target {
            return Err(RumormillError::InvalidMessage {
                reason: "nonce does not meet the proof-of-work difficulty".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::compute_nonce;

    fn test_rumor() -> RumorMessage {
        let mut msg = RumorMessage {
            origin: "abcdefgh22334455".into(),
            destination: String::new(),
            id: 1,
            content: b"hello".to_vec(),
            signature: vec![0u8; SIGNATURE_LEN],
            nonce: vec![0u8; NONCE_LEN],
            previous_hop: None,
        };
        compute_nonce(&mut msg, 2);
        msg
    }

    #[test]
    fn sanity_accepts_valid_rumor() -> Result<()> {
        test_rumor().sanity_check(2)
    }

    #[test]
    fn sanity_rejects_bad_origin() {
        let mut msg = test_rumor();
        msg.origin = "NOT-A-NAME".into();
        assert!(msg.sanity_check(0).is_err());
    }

    #[test]
    fn sanity_rejects_bad_nonce_length() {
        let mut msg = test_rumor();
        msg.nonce = vec![0u8; 8];
        assert!(msg.sanity_check(0).is_err());
    }

    #[test]
    fn sanity_rejects_signature_on_announcement() {
        let mut msg = test_rumor();
        msg.id = 0;
        assert!(msg.sanity_check(0).is_err());
    }

    #[test]
    fn sanity_rejects_insufficient_pow() {
        let msg = test_rumor();
        // Difficulty 2 was mined; 30 bits is all but certain to fail.
        assert!(msg.sanity_check(30).is_err());
    }

    #[test]
    fn hash_ignores_previous_hop() {
        let mut msg = test_rumor();
        let before = msg.compute_hash();
        msg.previous_hop = Some("10.0.0.1:5000".into());
        assert_eq!(before, msg.compute_hash());
    }

    #[test]
    fn hash_covers_content() {
        let mut msg = test_rumor();
        let before = msg.compute_hash();
        msg.content = b"tampered".to_vec();
        assert_ne!(before, msg.compute_hash());
    }

    #[test]
    fn route_message_detection() {
        let mut msg = test_rumor();
        assert!(!msg.is_route_message());
        msg.content.clear();
        assert!(msg.is_route_message());
        msg.id = 0;
        assert!(!msg.is_route_message());
    }
}
