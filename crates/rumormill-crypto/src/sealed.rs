//! Sealed-box encryption for private message content.
//!
//! Private messages are encrypted to the destination's announced
//! public key. The construction is a per-message sealed box:
//!
//! ```text
//! eph      = fresh X25519 keypair
//! shared   = X25519(eph.secret, recipient_x25519_pub)
//! key      = HKDF-SHA256(shared, salt = "rumormill-sealed",
//!                        info = sender_pub || recipient_pub)
//! blob     = eph.pub(32) || nonce(24) || XChaCha20-Poly1305(key, nonce, pt)
//! ```
//!
//! The recipient's X25519 key is derived from its Ed25519 verifying
//! key (Edwards → Montgomery, RFC 7748), so only the Ed25519 key needs
//! to be announced on the network.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use ed25519_dalek::VerifyingKey;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use rumormill_types::{Result, RumormillError};
use sha2::{Digest, Sha256, Sha512};

use crate::keys::{Keypair, PublicKey};

/// HKDF salt, fixed per protocol.
const HKDF_SALT: &[u8] = b"rumormill-sealed";

/// Byte length of the XChaCha20-Poly1305 nonce.
const AEAD_NONCE_LEN: usize = 24;

/// Minimum sealed blob length: ephemeral key + nonce + Poly1305 tag.
const MIN_BLOB_LEN: usize = 32 + AEAD_NONCE_LEN + 16;

// ---------------------------------------------------------------------------
// Key conversion
// ---------------------------------------------------------------------------

/// Converts an Ed25519 verifying key to its X25519 (Montgomery) form.
fn ed25519_pub_to_x25519(key: &PublicKey) -> Result<x25519_dalek::PublicKey> {
    let vk = VerifyingKey::from_bytes(key.as_bytes()).map_err(|e| {
        RumormillError::CryptoError {
            reason: format!("invalid public key: {e}"),
        }
    })?;
    Ok(x25519_dalek::PublicKey::from(vk.to_montgomery().to_bytes()))
}

/// Converts an Ed25519 keypair to an X25519 static secret.
///
/// Per RFC 8032 the Ed25519 secret scalar is the clamped first half of
/// SHA-512(seed); `x25519-dalek` clamps during scalar multiplication,
/// so the raw hash bytes are used directly.
fn ed25519_secret_to_x25519(keypair: &Keypair) -> x25519_dalek::StaticSecret {
    let hash = Sha512::digest(keypair.signing_key.to_bytes());
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&hash[..32]);
    x25519_dalek::StaticSecret::from(scalar)
}

/// Derives the symmetric session key from an ECDH shared secret and
/// the sender/recipient context.
fn derive_session_key(shared: &[u8; 32], context: &[u8]) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared);
    let mut okm = [0u8; 32];
    hk.expand(context, &mut okm)
        .map_err(|e| RumormillError::CryptoError {
            reason: format!("HKDF expand failed: {e}"),
        })?;
    Ok(okm)
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Encrypts `plaintext` to `recipient`, producing a self-contained
/// sealed blob (`eph_pub || nonce || ciphertext+tag`).
///
/// A fresh ephemeral X25519 keypair is generated per call, so each
/// blob has an independent session key.
///
/// # Errors
///
/// Returns [`RumormillError::CryptoError`] if the recipient key is
/// invalid or encryption fails.
pub fn seal(sender: &Keypair, recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let eph_secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let eph_public = x25519_dalek::PublicKey::from(&eph_secret);

    let recipient_x = ed25519_pub_to_x25519(recipient)?;
    let shared = eph_secret.diffie_hellman(&recipient_x);

    let mut context = Vec::with_capacity(64);
    context.extend_from_slice(sender.public_key().as_bytes());
    context.extend_from_slice(recipient.as_bytes());
    let key = derive_session_key(shared.as_bytes(), &context)?;

    let mut nonce = [0u8; AEAD_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| RumormillError::CryptoError {
            reason: format!("AEAD encryption failed: {e}"),
        })?;

    let mut blob = Vec::with_capacity(32 + AEAD_NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(eph_public.as_bytes());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypts a sealed blob addressed to `recipient`.
///
/// `sender_pub` must be the announced key of the message origin; it is
/// bound into the session-key derivation, so a blob re-attributed to a
/// different sender fails to open.
///
/// # Errors
///
/// Returns [`RumormillError::CryptoError`] if the blob is truncated,
/// the keys do not match, or the ciphertext is tampered.
pub fn open(recipient: &Keypair, sender_pub: &PublicKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(RumormillError::CryptoError {
            reason: format!("sealed blob too short: {} bytes", blob.len()),
        });
    }

    let mut eph_bytes = [0u8; 32];
    eph_bytes.copy_from_slice(&blob[..32]);
    let eph_public = x25519_dalek::PublicKey::from(eph_bytes);
    let nonce = &blob[32..32 + AEAD_NONCE_LEN];
    let ciphertext = &blob[32 + AEAD_NONCE_LEN..];

    let recipient_secret = ed25519_secret_to_x25519(recipient);
    let shared = recipient_secret.diffie_hellman(&eph_public);

    let mut context = Vec::with_capacity(64);
    context.extend_from_slice(sender_pub.as_bytes());
    context.extend_from_slice(recipient.public_key().as_bytes());
    let key = derive_session_key(shared.as_bytes(), &context)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| RumormillError::CryptoError {
            reason: format!("AEAD decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Keypair {
        Keypair::from_seed(&[0xA1; 32])
    }

    fn bob() -> Keypair {
        Keypair::from_seed(&[0xB0; 32])
    }

    #[test]
    fn seal_open_roundtrip() -> Result<()> {
        let blob = seal(&alice(), &bob().public_key(), b"meet at noon")?;
        let plain = open(&bob(), &alice().public_key(), &blob)?;
        assert_eq!(plain, b"meet at noon");
        Ok(())
    }

    #[test]
    fn wrong_recipient_cannot_open() -> Result<()> {
        let eve = Keypair::from_seed(&[0xEE; 32]);
        let blob = seal(&alice(), &bob().public_key(), b"secret")?;
        assert!(open(&eve, &alice().public_key(), &blob).is_err());
        Ok(())
    }

    #[test]
    fn wrong_sender_attribution_fails() -> Result<()> {
        let eve = Keypair::from_seed(&[0xEE; 32]);
        let blob = seal(&alice(), &bob().public_key(), b"secret")?;
        assert!(open(&bob(), &eve.public_key(), &blob).is_err());
        Ok(())
    }

    #[test]
    fn tampered_blob_fails() -> Result<()> {
        let mut blob = seal(&alice(), &bob().public_key(), b"secret")?;
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(open(&bob(), &alice().public_key(), &blob).is_err());
        Ok(())
    }

    #[test]
    fn truncated_blob_rejected() {
        assert!(open(&bob(), &alice().public_key(), &[0u8; 10]).is_err());
    }

    #[test]
    fn blobs_are_randomised() -> Result<()> {
        let b1 = seal(&alice(), &bob().public_key(), b"same text")?;
        let b2 = seal(&alice(), &bob().public_key(), b"same text")?;
        assert_ne!(b1, b2);
        Ok(())
    }
}
