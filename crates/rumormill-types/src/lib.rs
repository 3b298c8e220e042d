//! Core shared types for the rumormill gossip node.
//!
//! This crate defines the types used across the workspace. No other
//! crate should define shared types — everything lives here.

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DisplayName
// ---------------------------------------------------------------------------

/// Self-certifying node name: 16 lowercase Base32 characters derived
/// from the first 80 bits of the SHA-256 fingerprint of the node's
/// public key.
///
/// Anyone holding the key can re-derive the name, so the name alone
/// proves ownership of the key it was derived from.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Fixed character length of a display name (80 bits / 5 bits per
    /// Base32 character).
    pub const LEN: usize = 16;

    /// Wraps an already-validated name without re-checking.
    ///
    /// Only the crypto crate's name derivation should call this; all
    /// external input goes through [`FromStr`].
    pub fn from_derived(name: String) -> Self {
        Self(name)
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that `s` is a syntactically valid display name:
    /// exactly 16 characters from the lowercase RFC 4648 alphabet.
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::LEN
            && s.bytes()
                .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DisplayName {
    type Err = RumormillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(RumormillError::InvalidName {
                reason: format!("'{s}' is not a 16-char lowercase Base32 name"),
            });
        }
        Ok(Self(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// PeerClass
// ---------------------------------------------------------------------------

/// How a peer entered the peer set.
///
/// The numeric representation is part of the HTTP API (`GET /node`
/// returns `{Address, Type}` with the integer class).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PeerClass {
    /// Supplied on the command line or via `POST /node`.
    Manual = 0,
    /// Learned from the source address of an incoming datagram.
    Learned = 1,
    /// Learned from the previous-hop hint carried in a rumor.
    ShortCircuited = 2,
}

impl fmt::Display for PeerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Learned => write!(f, "learned"),
            Self::ShortCircuited => write!(f, "short-circuited"),
        }
    }
}

// ---------------------------------------------------------------------------
// RumormillError
// ---------------------------------------------------------------------------

/// Central error type for the rumormill system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
#[derive(Debug, Error)]
pub enum RumormillError {
    /// A display name is malformed or does not match its key.
    #[error("invalid name: {reason}")]
    InvalidName {
        /// Human-readable description of why the name is invalid.
        reason: String,
    },

    /// A message is malformed, missing required fields, or fails
    /// structural validation.
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// Human-readable description of the validation failure.
        reason: String,
    },

    /// A cryptographic operation failed (signing, verification,
    /// encryption, decryption, proof-of-work).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// A storage or database operation failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A networking or transport operation failed.
    #[error("network error: {reason}")]
    NetworkError {
        /// Human-readable description of the network failure.
        reason: String,
    },

    /// A protocol-level error (wire codec, schema, hop limits).
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// A bounded sub-protocol exhausted its retry budget.
    #[error("timed out: {reason}")]
    Timeout {
        /// Human-readable description including the retry budget.
        reason: String,
    },

    /// A requested entity (file, route, message) is not known locally.
    #[error("not found: {reason}")]
    NotFound {
        /// Human-readable description of what was missing.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

/// Convenience result type using [`RumormillError`].
pub type Result<T> = std::result::Result<T, RumormillError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_name_parses() -> Result<()> {
        let name: DisplayName = "abcdefgh22334455".parse()?;
        assert_eq!(name.as_str(), "abcdefgh22334455");
        Ok(())
    }

    #[test]
    fn wrong_length_rejected() {
        assert!("abc".parse::<DisplayName>().is_err());
        assert!("abcdefgh223344556".parse::<DisplayName>().is_err());
    }

    #[test]
    fn uppercase_rejected() {
        assert!("ABCDEFGH22334455".parse::<DisplayName>().is_err());
    }

    #[test]
    fn digits_outside_base32_rejected() {
        // '0', '1', '8', '9' are not in the RFC 4648 alphabet.
        assert!("abcdefgh01898989".parse::<DisplayName>().is_err());
    }

    #[test]
    fn name_serde_is_transparent() {
        let name = DisplayName::from_derived("abcdefgh22334455".into());
        let json = serde_json::to_string(&name).expect("serialize");
        assert_eq!(json, "\"abcdefgh22334455\"");
    }

    #[test]
    fn peer_class_display() {
        assert_eq!(PeerClass::Manual.to_string(), "manual");
        assert_eq!(PeerClass::Learned.to_string(), "learned");
        assert_eq!(PeerClass::ShortCircuited.to_string(), "short-circuited");
    }

    #[test]
    fn error_display_includes_reason() {
        let err = RumormillError::InvalidMessage {
            reason: "nonce too short".into(),
        };
        assert!(err.to_string().contains("nonce too short"));
    }
}
