//! The single-writer event loop.
//!
//! One task owns the [`NodeState`] and multiplexes four sources:
//! queued closures from workers, decoded datagrams from the socket
//! receiver, the one-second anti-entropy tick and the `rtimer` route
//! broadcasting tick. Handler errors are logged and discarded at
//! packet boundaries — the loop itself never dies on one.

use std::time::Duration;

use rumormill_protocol::packet::GossipPacket;
use rumormill_types::PeerClass;
use tokio::sync::mpsc;

use crate::compose;
use crate::gossip;
use crate::handle::Task;
use crate::routing;
use crate::search;
use crate::state::NodeState;

/// Anti-entropy period.
const ANTI_ENTROPY_PERIOD: Duration = Duration::from_secs(1);

/// Runs the event loop until every work source closes.
pub async fn run_event_loop(
    mut state: NodeState,
    mut tasks: mpsc::Receiver<Task>,
    mut inbound: mpsc::Receiver<(GossipPacket, String)>,
) {
    tracing::info!("event loop starting");

    let mut anti_entropy = tokio::time::interval(ANTI_ENTROPY_PERIOD);
    anti_entropy.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately, which doubles as the startup
    // route broadcast.
    let mut route_tick =
        tokio::time::interval(Duration::from_secs(state.handle.config.rtimer_secs.max(1)));
    route_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            task = tasks.recv() => match task {
                Some(task) => task(&mut state),
                None => break,
            },

            datagram = inbound.recv() => match datagram {
                Some((packet, sender)) => dispatch(&mut state, packet, &sender),
                None => break,
            },

            _ = anti_entropy.tick() => {
                gossip::anti_entropy_tick(&state);
            }

            _ = route_tick.tick() => {
                // Route rumors are mined like any other message, so
                // composition runs off-loop.
                let handle = state.handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = compose::broadcast_route_rumor(&handle).await {
                        tracing::warn!(%e, "route broadcast failed");
                    }
                });
            }
        }
    }

    tracing::info!("event loop exited");
}

/// Dispatches one decoded packet.
fn dispatch(state: &mut NodeState, packet: GossipPacket, sender: &str) {
    // Any datagram teaches us its sender.
    if !state.peers.contains_key(sender) {
        state.peers.insert(sender.to_string(), PeerClass::Learned);
        tracing::info!(peer = %sender, "learned new peer");
    }

    if let Some(rumor) = packet.rumor {
        if let Err(e) = gossip::handle_rumor(state, rumor, sender) {
            tracing::warn!(%e, "rumor handler failed");
        }
    }
    if let Some(status) = packet.status {
        if let Err(e) = gossip::handle_status(state, status, sender) {
            tracing::warn!(%e, "status handler failed");
        }
    }
    if let Some(request) = packet.data_request {
        routing::forward_data_request(state, request);
    }
    if let Some(reply) = packet.data_reply {
        routing::forward_data_reply(state, reply);
    }
    if let Some(request) = packet.search_request {
        search::handle_search_request(state, request, sender);
    }
    if let Some(reply) = packet.search_reply {
        routing::forward_search_reply(state, reply);
    }
}
