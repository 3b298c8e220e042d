//! Proof-of-work nonce computation.
//!
//! The nonce is a 16-byte little-endian counter incremented from zero
//! until the SHA-256 of the full message has at least `target` leading
//! zero bits. CPU-intensive — callers in async contexts must run this
//! under `tokio::task::spawn_blocking`.

use rumormill_crypto::hash::leading_zero_bits;

use crate::rumor::{RumorMessage, NONCE_LEN};

/// Brute-forces the proof-of-work nonce for `msg` in place.
///
/// The existing nonce is discarded; on return
/// `leading_zero_bits(msg.compute_hash()) >= target` holds.
pub fn compute_nonce(msg: &mut RumorMessage, target: u32) {
    msg.nonce = vec![0u8; NONCE_LEN];

    let started = std::time::Instant::now();
    let mut tries: u64 = 0;
    loop {
        tries += 1;
        if leading_zero_bits(&msg.compute_hash()) >= target {
            break;
        }
        increment_nonce(&mut msg.nonce);
    }
    tracing::debug!(
        target_bits = target,
        tries,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proof-of-work nonce computed"
    );
}

/// Increments the nonce as a little-endian 128-bit counter.
fn increment_nonce(nonce: &mut [u8]) {
    for byte in nonce.iter_mut() {
        if *byte < 255 {
            *byte += 1;
            return;
        }
        *byte = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unmined_rumor() -> RumorMessage {
        RumorMessage {
            origin: "abcdefgh22334455".into(),
            destination: String::new(),
            id: 1,
            content: b"content".to_vec(),
            signature: vec![0u8; 64],
            nonce: Vec::new(),
            previous_hop: None,
        }
    }

    #[test]
    fn computed_nonce_meets_target() {
        let mut msg = unmined_rumor();
        compute_nonce(&mut msg, 8);
        assert!(leading_zero_bits(&msg.compute_hash()) >= 8);
        assert_eq!(msg.nonce.len(), NONCE_LEN);
    }

    #[test]
    fn target_zero_accepts_initial_nonce() {
        let mut msg = unmined_rumor();
        compute_nonce(&mut msg, 0);
        assert_eq!(msg.nonce, vec![0u8; NONCE_LEN]);
    }

    #[test]
    fn increment_carries_across_bytes() {
        let mut nonce = vec![255u8, 255, 0];
        increment_nonce(&mut nonce);
        assert_eq!(nonce, vec![0, 0, 1]);
    }

    #[test]
    fn increment_wraps_at_max() {
        let mut nonce = vec![255u8; 3];
        increment_nonce(&mut nonce);
        assert_eq!(nonce, vec![0, 0, 0]);
    }
}
