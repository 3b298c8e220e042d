//! Datagram transport for gossip packets.
//!
//! A single bound UDP socket carries all traffic. Receiving happens in
//! one spawned task that decodes datagrams and forwards them to the
//! event loop; sending is non-blocking and may be called from any
//! worker. Malformed datagrams and datagrams from the node's own bound
//! address are dropped silently.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use rumormill_protocol::codec::{self, MAX_DATAGRAM};
use rumormill_protocol::packet::GossipPacket;
use rumormill_types::{Result, RumormillError};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Buffered capacity of the inbound packet channel.
const INBOUND_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Address handling
// ---------------------------------------------------------------------------

/// Resolves `address` (possibly a domain name, possibly bare
/// `":port"`) to a canonical `ip:port` string.
///
/// # Errors
///
/// Returns [`RumormillError::NetworkError`] if resolution fails or
/// yields no address.
pub fn resolve_address(address: &str) -> Result<String> {
    if address.is_empty() {
        return Err(RumormillError::NetworkError {
            reason: "empty address".into(),
        });
    }
    // ":5000" means "all interfaces, port 5000".
    let full = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };
    let resolved = full
        .to_socket_addrs()
        .map_err(|e| RumormillError::NetworkError {
            reason: format!("cannot resolve '{address}': {e}"),
        })?
        .next()
        .ok_or_else(|| RumormillError::NetworkError {
            reason: format!("'{address}' resolved to no addresses"),
        })?;
    Ok(resolved.to_string())
}

// ---------------------------------------------------------------------------
// GossipSocket
// ---------------------------------------------------------------------------

/// The node's bound UDP socket.
///
/// Cheap to clone via `Arc`; sends are safe from any task, receives
/// happen only in the task spawned by [`GossipSocket::spawn_receiver`].
#[derive(Clone)]
pub struct GossipSocket {
    socket: Arc<UdpSocket>,
    local_addr: String,
}

impl GossipSocket {
    /// Binds the socket to `listen_addr` (`ip:port` or `:port`).
    ///
    /// # Errors
    ///
    /// Returns [`RumormillError::NetworkError`] on resolution or bind
    /// failure; fatal at startup.
    pub async fn bind(listen_addr: &str) -> Result<Self> {
        let addr = resolve_address(listen_addr)?;
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|e| RumormillError::NetworkError {
                reason: format!("cannot bind '{addr}': {e}"),
            })?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| RumormillError::NetworkError {
                reason: format!("cannot read bound address: {e}"),
            })?
            .to_string();
        tracing::info!(%local_addr, "gossip socket bound");
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    /// The canonical `ip:port` the socket is bound to.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Encodes and sends a packet to `address`, best-effort.
    ///
    /// UDP gives no delivery guarantee anyway, so encoding failures,
    /// unparsable addresses and a momentarily unwritable socket all
    /// degrade to a logged drop.
    pub fn send(&self, packet: &GossipPacket, address: &str) {
        let data = match codec::encode(packet) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(%e, "dropping unencodable packet");
                return;
            }
        };
        let target: SocketAddr = match address.parse() {
            Ok(addr) => addr,
            Err(_) => match resolve_address(address).and_then(|a| {
                a.parse().map_err(|e| RumormillError::NetworkError {
                    reason: format!("bad address '{a}': {e}"),
                })
            }) {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::debug!(%e, address, "dropping packet to unresolvable address");
                    return;
                }
            },
        };
        if let Err(e) = self.socket.try_send_to(&data, target) {
            tracing::debug!(%e, address, "datagram send failed");
        }
    }

    /// Spawns the receiver task.
    ///
    /// The task reads datagrams, drops those from the node's own
    /// address or that fail to decode, and forwards
    /// `(packet, sender)` pairs to the returned channel until the
    /// receiver side is dropped.
    pub fn spawn_receiver(&self) -> mpsc::Receiver<(GossipPacket, String)> {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
        let socket = Arc::clone(&self.socket);
        let local_addr = self.local_addr.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, sender) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!(%e, "datagram receive failed");
                        continue;
                    }
                };
                let sender = sender.to_string();
                if sender == local_addr {
                    // Spoofed or looped-back packet; adding ourselves
                    // as a peer would wedge the gossip.
                    continue;
                }
                let packet = match codec::decode(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::debug!(%e, %sender, "dropping malformed datagram");
                        continue;
                    }
                };
                if tx.send((packet, sender)).await.is_err() {
                    // Event loop gone; stop receiving.
                    return;
                }
            }
        });
        rx
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rumormill_protocol::packet::StatusPacket;

    #[test]
    fn resolve_plain_ip_port() -> Result<()> {
        assert_eq!(resolve_address("127.0.0.1:5000")?, "127.0.0.1:5000");
        Ok(())
    }

    #[test]
    fn resolve_bare_port_listens_everywhere() -> Result<()> {
        assert_eq!(resolve_address(":5000")?, "0.0.0.0:5000");
        Ok(())
    }

    #[test]
    fn resolve_localhost() -> Result<()> {
        let addr = resolve_address("localhost:5000")?;
        assert!(addr.ends_with(":5000"));
        Ok(())
    }

    #[test]
    fn resolve_empty_rejected() {
        assert!(resolve_address("").is_err());
    }

    #[test]
    fn resolve_garbage_rejected() {
        assert!(resolve_address("not an address").is_err());
    }

    #[tokio::test]
    async fn status_packet_travels_between_sockets() -> Result<()> {
        let a = GossipSocket::bind("127.0.0.1:0").await?;
        let b = GossipSocket::bind("127.0.0.1:0").await?;
        let mut inbound = b.spawn_receiver();

        let packet = GossipPacket::status(StatusPacket::default());
        a.send(&packet, b.local_addr());

        let (received, sender) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            inbound.recv(),
        )
        .await
        .expect("timed out")
        .expect("channel closed");
        assert!(received.status.is_some());
        assert_eq!(sender, a.local_addr());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_datagram_is_dropped() -> Result<()> {
        let a = GossipSocket::bind("127.0.0.1:0").await?;
        let b = GossipSocket::bind("127.0.0.1:0").await?;
        let mut inbound = b.spawn_receiver();

        // Raw garbage straight through the inner socket.
        a.socket
            .send_to(b"\xFF\xFF garbage", b.local_addr().parse::<SocketAddr>().unwrap())
            .await
            .expect("send");
        // Then a valid packet; only the valid one must surface.
        a.send(&GossipPacket::status(StatusPacket::default()), b.local_addr());

        let (received, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            inbound.recv(),
        )
        .await
        .expect("timed out")
        .expect("channel closed");
        assert!(received.status.is_some());
        Ok(())
    }
}
