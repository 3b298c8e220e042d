//! Self-certifying display-name derivation.
//!
//! A node's display name is the lowercase RFC 4648 Base32 encoding of
//! the leading 80 bits of the SHA-256 fingerprint of its serialised
//! public key: 10 bytes → exactly 16 characters, no padding. Names are
//! self-signing — anyone can verify that a name belongs to a given key
//! by re-deriving it.

use rumormill_types::DisplayName;

use crate::hash::sha256;
use crate::keys::PublicKey;

/// Number of fingerprint bits that feed the display name.
pub const NAME_BITS: usize = 80;

/// Lowercase RFC 4648 Base32 alphabet.
const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Derives the display name of a public key.
pub fn derive_name(key: &PublicKey) -> DisplayName {
    let fingerprint = sha256(key.as_bytes());
    DisplayName::from_derived(base32_lower(&fingerprint[..NAME_BITS / 8]))
}

/// Encodes `data` as lowercase RFC 4648 Base32 without padding.
///
/// `data.len()` must be a multiple of 5 so no padding is required;
/// the single caller passes exactly 10 bytes.
fn base32_lower(data: &[u8]) -> String {
    debug_assert_eq!(data.len() % 5, 0);
    let mut out = String::with_capacity(data.len() / 5 * 8);
    for group in data.chunks(5) {
        let mut buf: u64 = 0;
        for &b in group {
            buf = (buf << 8) | u64::from(b);
        }
        for shift in (0..8).rev() {
            let index = ((buf >> (shift * 5)) & 0x1F) as usize;
            out.push(ALPHABET[index] as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;

    #[test]
    fn name_has_sixteen_valid_chars() {
        let kp = Keypair::from_seed(&[0x11; 32]);
        let name = derive_name(&kp.public_key());
        assert!(DisplayName::is_valid(name.as_str()));
    }

    #[test]
    fn name_is_deterministic() {
        let kp1 = Keypair::from_seed(&[0x22; 32]);
        let kp2 = Keypair::from_seed(&[0x22; 32]);
        assert_eq!(
            derive_name(&kp1.public_key()),
            derive_name(&kp2.public_key()),
        );
    }

    #[test]
    fn different_keys_get_different_names() {
        let kp1 = Keypair::from_seed(&[0x01; 32]);
        let kp2 = Keypair::from_seed(&[0x02; 32]);
        assert_ne!(
            derive_name(&kp1.public_key()),
            derive_name(&kp2.public_key()),
        );
    }

    #[test]
    fn base32_known_vector() {
        // RFC 4648: BASE32("fooba") = "MZXW6YTB" (lowercased here).
        assert_eq!(base32_lower(b"fooba"), "mzxw6ytb");
    }
}
