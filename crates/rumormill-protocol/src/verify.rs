//! Full verification of incoming rumors.
//!
//! Verification is layered: structural sanity (lengths, names, PoW),
//! then identity. A key announcement (`id == 0`) must carry a public
//! key whose derived name equals the origin; any later message must
//! verify against the key announced in `(origin, 0)`. The caller looks
//! the announced key up in its message store and passes it in — this
//! crate stays storage-free.

use rumormill_crypto::keys::{verify, PublicKey, Signature};
use rumormill_crypto::name::derive_name;
use rumormill_types::{Result, RumormillError};

use crate::rumor::RumorMessage;

/// Verifies an incoming rumor.
///
/// `announced_key` is the public key from the origin's key
/// announcement, or `None` if no announcement has been seen yet.
///
/// # Errors
///
/// - [`RumormillError::InvalidMessage`] on any structural failure.
/// - [`RumormillError::InvalidName`] if a key announcement's derived
///   name does not match its origin.
/// - [`RumormillError::CryptoError`] on signature failure.
/// - [`RumormillError::NotFound`] if `id > 0` and no key announcement
///   is known for the origin (out-of-order or unknown origin).
pub fn verify_rumor(
    msg: &RumorMessage,
    pow_target: u32,
    announced_key: Option<&PublicKey>,
) -> Result<()> {
    msg.sanity_check(pow_target)?;

    if msg.id == 0 {
        let key = PublicKey::from_bytes(&msg.content)?;
        let derived = derive_name(&key);
        if derived.as_str() != msg.origin {
            return Err(RumormillError::InvalidName {
                reason: format!(
                    "key announcement claims '{}' but the key derives '{}'",
                    msg.origin, derived,
                ),
            });
        }
        return Ok(());
    }

    let key = announced_key.ok_or_else(|| RumormillError::NotFound {
        reason: format!("no key announcement known for origin '{}'", msg.origin),
    })?;
    let signature = Signature::from_bytes(&msg.signature)?;
    verify(key, &msg.payload(), &signature)
}

/// Parses the public key out of a key-announcement content field.
///
/// Convenience for callers that already trust the stored announcement.
pub fn announced_key(content: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::compute_nonce;
    use crate::rumor::NONCE_LEN;
    use rumormill_crypto::keys::Keypair;

    const POW: u32 = 2;

    fn keypair() -> Keypair {
        Keypair::from_seed(&[0x37; 32])
    }

    fn announcement(kp: &Keypair) -> RumorMessage {
        let mut msg = RumorMessage {
            origin: derive_name(&kp.public_key()).as_str().to_string(),
            destination: String::new(),
            id: 0,
            content: kp.public_key().as_bytes().to_vec(),
            signature: Vec::new(),
            nonce: vec![0u8; NONCE_LEN],
            previous_hop: None,
        };
        compute_nonce(&mut msg, POW);
        msg
    }

    fn signed_rumor(kp: &Keypair, id: u32, content: &[u8]) -> RumorMessage {
        let mut msg = RumorMessage {
            origin: derive_name(&kp.public_key()).as_str().to_string(),
            destination: String::new(),
            id,
            content: content.to_vec(),
            signature: Vec::new(),
            nonce: vec![0u8; NONCE_LEN],
            previous_hop: None,
        };
        msg.signature = kp.sign(&msg.payload()).as_bytes().to_vec();
        compute_nonce(&mut msg, POW);
        msg
    }

    #[test]
    fn valid_announcement_verifies() -> Result<()> {
        verify_rumor(&announcement(&keypair()), POW, None)
    }

    #[test]
    fn announcement_with_foreign_name_rejected() {
        let kp = keypair();
        let other = Keypair::from_seed(&[0x99; 32]);
        let mut msg = announcement(&kp);
        msg.origin = derive_name(&other.public_key()).as_str().to_string();
        compute_nonce(&mut msg, POW);
        assert!(verify_rumor(&msg, POW, None).is_err());
    }

    #[test]
    fn valid_signed_rumor_verifies() -> Result<()> {
        let kp = keypair();
        let msg = signed_rumor(&kp, 1, b"hello");
        verify_rumor(&msg, POW, Some(&kp.public_key()))
    }

    #[test]
    fn signed_rumor_without_known_key_rejected() {
        let msg = signed_rumor(&keypair(), 1, b"hello");
        assert!(verify_rumor(&msg, POW, None).is_err());
    }

    #[test]
    fn forged_signature_rejected() {
        let kp = keypair();
        let forger = Keypair::from_seed(&[0x55; 32]);
        let mut msg = signed_rumor(&kp, 1, b"hello");
        msg.signature = forger.sign(&msg.payload()).as_bytes().to_vec();
        compute_nonce(&mut msg, POW);
        assert!(verify_rumor(&msg, POW, Some(&kp.public_key())).is_err());
    }

    #[test]
    fn tampered_content_rejected() {
        let kp = keypair();
        let mut msg = signed_rumor(&kp, 1, b"hello");
        msg.content = b"evil".to_vec();
        compute_nonce(&mut msg, POW);
        assert!(verify_rumor(&msg, POW, Some(&kp.public_key())).is_err());
    }
}
