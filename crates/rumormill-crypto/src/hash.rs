//! SHA-256 helpers.

use sha2::{Digest, Sha256};

/// Byte length of a SHA-256 digest.
pub const HASH_LEN: usize = 32;

/// Computes SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Counts the number of leading zero bits in a hash.
pub fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut count = 0;
    for &byte in hash {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string.
        let digest = sha256(b"");
        assert_eq!(
            digest[..4],
            [0xe3, 0xb0, 0xc4, 0x42],
        );
    }

    #[test]
    fn leading_zeros_all_zero() {
        assert_eq!(leading_zero_bits(&[0u8; 32]), 256);
    }

    #[test]
    fn leading_zeros_first_byte() {
        let mut h = [0u8; 32];
        h[0] = 0b0000_1000;
        assert_eq!(leading_zero_bits(&h), 4);
    }

    #[test]
    fn leading_zeros_second_byte() {
        let mut h = [0u8; 32];
        h[1] = 0b0010_0000;
        assert_eq!(leading_zero_bits(&h), 10);
    }

    #[test]
    fn leading_zeros_high_bit() {
        let mut h = [0xFFu8; 32];
        h[0] = 0b1000_0000;
        assert_eq!(leading_zero_bits(&h), 0);
    }
}
