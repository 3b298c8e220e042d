//! Point-to-point forwarding over the next-hop table.
//!
//! Data requests/replies and search replies carry
//! `(origin, destination, hop_limit)`. At every node: deliver locally
//! if the destination is us; otherwise drop under `noforward`, drop at
//! hop limit zero, drop without a route — and in the remaining case
//! decrement the limit and pass the packet to the next hop. Drops are
//! silent on the wire; there are no negative acknowledgements.

use rumormill_files::{verify_chunk, verify_metafile};
use rumormill_protocol::packet::{DataReply, DataRequest, GossipPacket, SearchReply};
use rumormill_protocol::HOP_LIMIT;

use crate::state::{DataExpectation, NodeState};

/// Looks up the next hop for `destination`, honouring the forwarding
/// gates. Returns `None` when the packet must be dropped.
fn next_hop<'a>(state: &'a NodeState, destination: &str, hop_limit: u32) -> Option<&'a str> {
    if state.handle.config.no_forward {
        tracing::debug!(destination, "not forwarding (noforward set)");
        return None;
    }
    if hop_limit == 0 {
        tracing::debug!(destination, "not forwarding (hop limit exhausted)");
        return None;
    }
    match state.routing.get(destination) {
        Some(next) => Some(next.as_str()),
        None => {
            tracing::debug!(destination, "not forwarding (no route)");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Data requests
// ---------------------------------------------------------------------------

/// Routes a data request; at its destination, answers it.
///
/// A metafile request (non-empty `file_name`) is always answered —
/// with an empty payload if the file is not held, so the requester can
/// stop retrying. A chunk request for an unknown chunk is dropped.
pub fn forward_data_request(state: &mut NodeState, mut req: DataRequest) {
    if req.destination == state.name() {
        if !req.file_name.is_empty() {
            let data = state
                .get_file_by_name_and_hash(&req.file_name, &req.hash_value)
                .map(|file| file.metafile.clone())
                .unwrap_or_default();
            forward_data_reply(
                state,
                DataReply {
                    origin: state.name().to_string(),
                    destination: req.origin,
                    hop_limit: HOP_LIMIT,
                    file_name: req.file_name,
                    hash_value: req.hash_value,
                    data,
                },
            );
        } else if let Some(chunk) = state.chunk_db.get(&req.hash_value) {
            forward_data_reply(
                state,
                DataReply {
                    origin: state.name().to_string(),
                    destination: req.origin,
                    hop_limit: HOP_LIMIT,
                    file_name: String::new(),
                    hash_value: req.hash_value,
                    data: chunk.clone(),
                },
            );
        }
        return;
    }

    if let Some(next) = next_hop(state, &req.destination, req.hop_limit) {
        let next = next.to_string();
        req.hop_limit -= 1;
        state.send_packet(&GossipPacket::data_request(req), &next);
    }
}

// ---------------------------------------------------------------------------
// Data replies
// ---------------------------------------------------------------------------

/// Routes a data reply; at its destination, delivers it to the
/// subscription waiting on that hash.
///
/// The payload is verified against the subscription's expectation
/// before delivery; an invalid payload leaves the subscription armed
/// so a later, correct reply can still land.
pub fn forward_data_reply(state: &mut NodeState, mut reply: DataReply) {
    if reply.destination == state.name() {
        let valid = match state.data_subs.get(&reply.hash_value) {
            Some(sub) => match &sub.expect {
                DataExpectation::Metafile { metahash } => {
                    verify_metafile(metahash, &reply.data)
                }
                DataExpectation::Chunk { index, metafile } => {
                    verify_chunk(*index, metafile, &reply.data)
                }
            },
            // Nobody is waiting: drop.
            None => return,
        };
        if valid {
            if let Some(sub) = state.data_subs.remove(&reply.hash_value) {
                let _ = sub.tx.send(reply.data);
            }
        } else {
            tracing::debug!(
                hash = %hex::encode(&reply.hash_value),
                "dropping data reply that fails verification"
            );
        }
        return;
    }

    if let Some(next) = next_hop(state, &reply.destination, reply.hop_limit) {
        let next = next.to_string();
        reply.hop_limit -= 1;
        state.send_packet(&GossipPacket::data_reply(reply), &next);
    }
}

// ---------------------------------------------------------------------------
// Search replies
// ---------------------------------------------------------------------------

/// Routes a search reply; at its destination, adds it to the running
/// search's result list.
pub fn forward_search_reply(state: &mut NodeState, mut reply: SearchReply) {
    if reply.destination == state.name() {
        state.search_results.push(reply);
        return;
    }

    if let Some(next) = next_hop(state, &reply.destination, reply.hop_limit) {
        let next = next.to_string();
        reply.hop_limit -= 1;
        state.send_packet(&GossipPacket::search_reply(reply), &next);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DataSubscription;
    use crate::testutil::{test_node, TestNode};
    use tokio::sync::oneshot;

    fn chunk_request(destination: &str, hash: Vec<u8>) -> DataRequest {
        DataRequest {
            origin: "aaaaaaaaaaaaaaaa".into(),
            destination: destination.into(),
            hop_limit: HOP_LIMIT,
            file_name: String::new(),
            hash_value: hash,
        }
    }

    #[tokio::test]
    async fn reply_for_unknown_hash_is_dropped() {
        let TestNode { mut state, .. } = test_node().await;
        let name = state.name().to_string();
        forward_data_reply(
            &mut state,
            DataReply {
                origin: "aaaaaaaaaaaaaaaa".into(),
                destination: name,
                hop_limit: HOP_LIMIT,
                file_name: String::new(),
                hash_value: vec![0xAA; 32],
                data: b"unsolicited".to_vec(),
            },
        );
        assert!(state.data_subs.is_empty());
    }

    #[tokio::test]
    async fn verified_chunk_reply_fires_subscription() {
        let TestNode { mut state, .. } = test_node().await;
        let name = state.name().to_string();

        let chunk = b"eight kib worth of data".to_vec();
        let file = rumormill_files::build_metadata("doc.bin", &chunk);
        let hash = rumormill_files::chunk_hash(&file.metafile, 0)
            .expect("chunk 0")
            .to_vec();

        let (tx, mut rx) = oneshot::channel();
        state.data_subs.insert(
            hash.clone(),
            DataSubscription {
                expect: DataExpectation::Chunk {
                    index: 0,
                    metafile: file.metafile.clone(),
                },
                tx,
            },
        );

        // A corrupted reply must leave the subscription armed.
        forward_data_reply(
            &mut state,
            DataReply {
                origin: "aaaaaaaaaaaaaaaa".into(),
                destination: name.clone(),
                hop_limit: HOP_LIMIT,
                file_name: String::new(),
                hash_value: hash.clone(),
                data: b"corrupted".to_vec(),
            },
        );
        assert!(state.data_subs.contains_key(&hash));
        assert!(rx.try_recv().is_err());

        forward_data_reply(
            &mut state,
            DataReply {
                origin: "aaaaaaaaaaaaaaaa".into(),
                destination: name,
                hop_limit: HOP_LIMIT,
                file_name: String::new(),
                hash_value: hash.clone(),
                data: chunk.clone(),
            },
        );
        assert!(!state.data_subs.contains_key(&hash));
        assert_eq!(rx.try_recv().expect("delivered"), chunk);
    }

    #[tokio::test]
    async fn request_at_hop_limit_zero_is_not_forwarded() {
        let TestNode { mut state, .. } = test_node().await;
        state
            .routing
            .insert("bbbbbbbbbbbbbbbb".into(), "127.0.0.1:9".into());
        let mut req = chunk_request("bbbbbbbbbbbbbbbb", vec![0x01; 32]);
        req.hop_limit = 0;
        // Nothing to assert on the wire; the contract is "no panic,
        // no state change".
        forward_data_request(&mut state, req);
        assert!(state.data_subs.is_empty());
    }

    #[tokio::test]
    async fn noforward_blocks_routed_traffic() {
        let TestNode { mut state, .. } = test_node().await;
        let mut config = (*state.handle.config).clone();
        config.no_forward = true;
        state.handle.config = std::sync::Arc::new(config);
        state
            .routing
            .insert("bbbbbbbbbbbbbbbb".into(), "127.0.0.1:9".into());
        assert!(next_hop(&state, "bbbbbbbbbbbbbbbb", HOP_LIMIT).is_none());
    }

    #[tokio::test]
    async fn search_reply_lands_in_result_list_at_destination() {
        let TestNode { mut state, .. } = test_node().await;
        let name = state.name().to_string();
        forward_search_reply(
            &mut state,
            SearchReply {
                origin: "aaaaaaaaaaaaaaaa".into(),
                destination: name,
                hop_limit: HOP_LIMIT,
                results: Vec::new(),
            },
        );
        assert_eq!(state.search_results.len(), 1);
    }
}
