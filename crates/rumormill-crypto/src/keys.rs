//! Ed25519 keypair lifecycle: generation, persistence, signing and
//! verification.
//!
//! The node identity is a single long-lived Ed25519 keypair. On first
//! start the keypair is generated from OS entropy and its 32-byte seed
//! is written to `<dataDir>/key.bin`; subsequent starts load it from
//! there. The private key is zeroized on drop via `ed25519-dalek`'s
//! built-in `ZeroizeOnDrop`.

use std::path::Path;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rumormill_types::{Result, RumormillError};

/// File name of the persisted keypair seed inside the data directory.
pub const KEY_FILE: &str = "key.bin";

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Ed25519 public key (32 bytes).
///
/// The raw byte form is also the key's on-wire serialisation: it is
/// the `content` of every key-announcement message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Fixed byte length of an Ed25519 public key.
    pub const LEN: usize = 32;

    /// Parses a serialised public key, rejecting wrong lengths and
    /// points that are not on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| RumormillError::CryptoError {
            reason: format!("public key must be 32 bytes, got {}", bytes.len()),
        })?;
        // Reject invalid curve points up front so verification failures
        // later cannot be confused with malformed keys.
        VerifyingKey::from_bytes(&arr).map_err(|e| RumormillError::CryptoError {
            reason: format!("invalid public key: {e}"),
        })?;
        Ok(Self(arr))
    }

    /// Returns the serialised (raw) form.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Fixed byte length of an Ed25519 signature.
    pub const LEN: usize = 64;

    /// Parses a signature from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| RumormillError::CryptoError {
            reason: format!("signature must be 64 bytes, got {}", bytes.len()),
        })?;
        Ok(Self(arr))
    }

    /// Returns the raw 64-byte form.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// Ed25519 signing keypair.
///
/// Wraps an `ed25519-dalek` [`SigningKey`]. Intentionally implements
/// neither `Clone` nor `Debug` to prevent accidental leakage of the
/// private key in logs or copies.
pub struct Keypair {
    /// `pub(crate)` so [`crate::sealed`] can convert the seed to an
    /// X25519 secret without exposing it to external callers.
    pub(crate) signing_key: SigningKey,
}

impl Keypair {
    /// Generates a new random keypair using OS-level entropy.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Loads the keypair from `<data_dir>/key.bin`, generating and
    /// persisting a fresh one if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RumormillError::StorageError`] if the directory cannot
    /// be created, the key file cannot be written, or an existing key
    /// file is corrupt. All of these are fatal at startup.
    pub fn load_or_generate(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| RumormillError::StorageError {
            reason: format!("cannot create data directory: {e}"),
        })?;

        let key_path = data_dir.join(KEY_FILE);
        match std::fs::read(&key_path) {
            Ok(bytes) => {
                let seed: [u8; 32] =
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| RumormillError::StorageError {
                            reason: format!(
                                "corrupt key file {} ({} bytes, expected 32)",
                                key_path.display(),
                                bytes.len(),
                            ),
                        })?;
                Ok(Self::from_seed(&seed))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("generating a new Ed25519 keypair for the first time");
                let kp = Self::generate();
                std::fs::write(&key_path, kp.signing_key.to_bytes()).map_err(|e| {
                    RumormillError::StorageError {
                        reason: format!("cannot write key file: {e}"),
                    }
                })?;
                Ok(kp)
            }
            Err(e) => Err(RumormillError::StorageError {
                reason: format!("cannot read key file: {e}"),
            }),
        }
    }

    /// Returns the public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs an arbitrary message.
    ///
    /// Deterministic: the same keypair and message always yield the
    /// same signature (RFC 8032).
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Verifies an Ed25519 signature against a public key and message.
///
/// # Errors
///
/// Returns [`RumormillError::CryptoError`] if the signature does not
/// verify.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let vk = VerifyingKey::from_bytes(public_key.as_bytes()).map_err(|e| {
        RumormillError::CryptoError {
            reason: format!("invalid public key: {e}"),
        }
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    vk.verify(message, &sig)
        .map_err(|e| RumormillError::CryptoError {
            reason: format!("signature verification failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
