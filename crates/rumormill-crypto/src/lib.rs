//! Cryptographic primitives for rumormill.
//!
//! - [`keys`] — Ed25519 keypair lifecycle (generate, persist, load),
//!   signing and verification.
//! - [`name`] — self-certifying display-name derivation.
//! - [`sealed`] — sealed-box encryption for private message content
//!   (ephemeral X25519 + HKDF-SHA256 + XChaCha20-Poly1305).
//! - [`hash`] — SHA-256 helpers shared by the protocol and file
//!   engines.

pub mod hash;
pub mod keys;
pub mod name;
pub mod sealed;
