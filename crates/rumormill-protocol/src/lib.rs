//! Wire protocol for rumormill.
//!
//! - [`rumor`] — the gossiped message, its hash and signing payload,
//!   structural sanity checks.
//! - [`packet`] — the [`packet::GossipPacket`] discriminated union and
//!   the point-to-point packet types (data, search).
//! - [`codec`] — CBOR encoding/decoding with the 64 KiB datagram cap.
//! - [`pow`] — proof-of-work nonce computation and checking.
//! - [`verify`] — full verification of incoming rumors.

pub mod codec;
pub mod packet;
pub mod pow;
pub mod rumor;
pub mod verify;

/// Hop limit assigned to freshly created point-to-point packets.
pub const HOP_LIMIT: u32 = 10;
