//! The gossip engine: rumor acceptance, rumor-mongering and
//! anti-entropy.
//!
//! Mongering is push-with-acknowledgement: the status a peer sends
//! after receiving a rumor is the ack. A fair coin bounds the fan-out
//! per message; the once-per-second anti-entropy status exchange
//! closes whatever gaps the coin leaves open.

use std::time::{Duration, Instant};

use rumormill_protocol::packet::{GossipPacket, PeerStatus, StatusPacket};
use rumormill_protocol::rumor::RumorMessage;
use rumormill_protocol::verify::verify_rumor;
use rumormill_types::{PeerClass, Result};
use tokio::sync::oneshot;

use crate::handle::NodeHandle;
use crate::state::{record_from_rumor, rumor_from_record, NodeState};

/// How long a mongering session waits for the acknowledging status.
const STATUS_WAIT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Incoming rumors
// ---------------------------------------------------------------------------

/// Processes a rumor received from `sender`.
///
/// Verification failures drop the rumor silently (logged reason, no
/// status — protocol violations get no acknowledgement). Everything
/// that verifies is acknowledged with the local status, whether
/// accepted, duplicate or out-of-order.
pub fn handle_rumor(state: &mut NodeState, msg: RumorMessage, sender: &str) -> Result<()> {
    tracing::info!(
        origin = %msg.origin,
        from = %sender,
        id = msg.id,
        bytes = msg.content.len(),
        "rumor received"
    );

    let key = if msg.id > 0 {
        state.announced_key_of(&msg.origin)?
    } else {
        None
    };
    if let Err(e) = verify_rumor(&msg, state.handle.config.pow_difficulty, key.as_ref()) {
        tracing::info!(%e, origin = %msg.origin, id = msg.id, "dropped rumor: failed verification");
        return Ok(());
    }

    let next = state.store.next_id(&msg.origin)?;
    if msg.id == next {
        accept(state, &msg, sender)?;
        state.send_status(sender);
        propagate(state, msg, sender);
    } else if msg.id < next {
        handle_duplicate(state, msg, sender, next)?;
    } else {
        tracing::debug!(
            origin = %msg.origin,
            id = msg.id,
            expected = next,
            "dropped out-of-order rumor"
        );
        state.send_status(sender);
    }
    Ok(())
}

/// Stores a new in-order rumor and learns routes from it.
fn accept(state: &mut NodeState, msg: &RumorMessage, sender: &str) -> Result<()> {
    state.store.insert_or_update(&record_from_rumor(msg, sender))?;

    state.routing.insert(msg.origin.clone(), sender.to_string());
    tracing::info!("DSDV {}: {}", msg.origin, sender);

    let hint = msg.previous_hop.as_deref().unwrap_or("");
    if !hint.is_empty() && !state.peers.contains_key(hint) {
        state
            .peers
            .insert(hint.to_string(), PeerClass::ShortCircuited);
    }
    Ok(())
}

/// Forwards an accepted (or conflict-retained) rumor onwards, with the
/// previous-hop hint rewritten to the address it arrived from.
///
/// Route rumors are flooded to every peer except the sender and ignore
/// `noforward`; everything else goes through rumor-mongering.
fn propagate(state: &mut NodeState, mut msg: RumorMessage, sender: &str) {
    msg.previous_hop = Some(sender.to_string());
    if msg.is_route_message() {
        let packet = GossipPacket::rumor(msg);
        for peer in state.peers.keys() {
            if peer != sender {
                state.send_packet(&packet, peer);
            }
        }
    } else if !state.handle.config.no_forward {
        if let Some(peer) = state.random_peer(&[sender]) {
            tracing::info!("MONGERING with {peer}");
            spawn_mongering(state.handle.clone(), msg, peer);
        }
    }
}

/// Handles a rumor whose ID was already seen: direct-route detection
/// on the duplicate-of-last, then conflict resolution by hash.
fn handle_duplicate(
    state: &mut NodeState,
    msg: RumorMessage,
    sender: &str,
    next: u32,
) -> Result<()> {
    let hint_empty = msg.previous_hop.as_deref().unwrap_or("").is_empty();
    if msg.id + 1 == next && hint_empty && !state.handle.config.disable_traversal {
        // A duplicate of the last message with no hint came straight
        // from its origin: the sender is a direct route.
        state.routing.insert(msg.origin.clone(), sender.to_string());
        tracing::info!("DIRECT-ROUTE FOR {}: {}", msg.origin, sender);
    }

    if let Some(stored) = state.store.get(&msg.origin, msg.id)? {
        let stored_hash = rumor_from_record(stored).compute_hash();
        if msg.compute_hash() < stored_hash {
            tracing::info!(
                origin = %msg.origin,
                id = msg.id,
                "conflict: replacing stored message with smaller-hash duplicate"
            );
            state.store.insert_or_update(&record_from_rumor(&msg, sender))?;
            state.send_status(sender);
            propagate(state, msg, sender);
            return Ok(());
        }
    }

    state.send_status(sender);
    Ok(())
}

// ---------------------------------------------------------------------------
// Incoming statuses
// ---------------------------------------------------------------------------

/// Delivers a status to the session awaiting it, or treats it as an
/// anti-entropy exchange if no session is listening.
pub fn handle_status(state: &mut NodeState, status: StatusPacket, sender: &str) -> Result<()> {
    tracing::debug!(from = %sender, entries = status.want.len(), "status received");

    let status = match state.status_subs.remove(sender) {
        Some(tx) => match tx.send(status) {
            Ok(()) => return Ok(()),
            // Session already gave up; fall through to anti-entropy.
            Err(status) => status,
        },
        None => status,
    };
    synchronize(state, &status.want, sender)
}

/// Compares vector clocks with `peer` and closes the gap: sends every
/// rumor the peer lacks, and a status back if the peer is ahead.
pub fn synchronize(state: &NodeState, other_want: &[PeerStatus], peer: &str) -> Result<()> {
    let (peer_behind, we_behind) = state.vector_clock_difference(other_want)?;

    let ours = state.store.vector_clock()?;
    for mismatch in &peer_behind {
        let our_next = ours
            .iter()
            .find(|(origin, _)| *origin == mismatch.identifier)
            .map(|(_, next)| *next)
            .unwrap_or(0);
        for id in mismatch.next_id..our_next {
            if let Some(rumor) = state.build_rumor(&mismatch.identifier, id)? {
                if state.handle.config.no_forward && !rumor.is_route_message() {
                    continue;
                }
                tracing::info!("MONGERING with {peer}");
                state.send_packet(&GossipPacket::rumor(rumor), peer);
            }
        }
    }

    if !we_behind.is_empty() {
        state.send_status(peer);
    }
    if peer_behind.is_empty() && we_behind.is_empty() {
        tracing::info!("IN SYNC WITH {peer}");
    }
    Ok(())
}

/// Anti-entropy tick: ship the local status to one random peer.
pub fn anti_entropy_tick(state: &NodeState) {
    if let Some(peer) = state.random_peer(&[]) {
        state.send_status(&peer);
    }
}

// ---------------------------------------------------------------------------
// Rumor-mongering sessions
// ---------------------------------------------------------------------------

/// Starts a rumor-mongering session towards `peer` on its own task.
pub fn spawn_mongering(handle: NodeHandle, msg: RumorMessage, peer: String) {
    tokio::spawn(async move {
        if let Err(e) = monger(handle, msg, peer).await {
            tracing::debug!(%e, "mongering session aborted");
        }
    });
}

/// One mongering session: send, await the acknowledging status for up
/// to a second, then either synchronize or flip a coin and continue
/// with a fresh peer.
async fn monger(handle: NodeHandle, msg: RumorMessage, mut peer: String) -> Result<()> {
    loop {
        let rx = {
            let msg = msg.clone();
            let peer = peer.clone();
            handle
                .run_sync(move |state| {
                    let (tx, rx) = oneshot::channel();
                    // Latest session wins: an older subscription to the
                    // same peer is overwritten and will time out.
                    state.status_subs.insert(peer.clone(), tx);
                    state.send_packet(&GossipPacket::rumor(msg), &peer);
                    rx
                })
                .await?
        };

        let started = Instant::now();
        let status = match tokio::time::timeout(STATUS_WAIT, rx).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(_)) => {
                // Our subscription was overwritten by a newer session.
                // Wait out the rest of the window, then proceed as a
                // timeout.
                tokio::time::sleep(STATUS_WAIT.saturating_sub(started.elapsed())).await;
                None
            }
            Err(_) => None,
        };

        let next_peer = {
            let peer = peer.clone();
            handle
                .run_sync(move |state| -> Result<Option<String>> {
                    state.status_subs.remove(&peer);
                    match status {
                        Some(status) => {
                            if state.vector_clock_equals(&status.want)? {
                                tracing::info!("IN SYNC WITH {peer}");
                                coin_flip(state, &peer)
                            } else {
                                synchronize(state, &status.want, &peer)?;
                                Ok(None)
                            }
                        }
                        None => coin_flip(state, &peer),
                    }
                })
                .await??
        };

        match next_peer {
            Some(next) => peer = next,
            None => return Ok(()),
        }
    }
}

/// Fair coin: with probability ½ pick a fresh peer to keep mongering
/// with, otherwise stop.
fn coin_flip(state: &NodeState, current: &str) -> Result<Option<String>> {
    if !rand::random::<bool>() {
        return Ok(None);
    }
    match state.random_peer(&[current]) {
        Some(next) => {
            tracing::info!("FLIPPED COIN sending rumor to {next}");
            Ok(Some(next))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
