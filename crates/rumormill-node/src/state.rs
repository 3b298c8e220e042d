//! The single-writer node state.
//!
//! Every field here is read and written only on the event-loop task.
//! Workers reach it through [`crate::handle::NodeHandle::run_sync`].

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rumormill_crypto::keys::PublicKey;
use rumormill_files::{FileDescriptor, SharedFile};
use rumormill_net::GossipSocket;
use rumormill_protocol::packet::{GossipPacket, PeerStatus, SearchReply, StatusPacket};
use rumormill_protocol::rumor::RumorMessage;
use rumormill_protocol::verify::announced_key;
use rumormill_store::{MessageRecord, MessageStore};
use rumormill_types::{PeerClass, Result};
use tokio::sync::oneshot;

use crate::handle::NodeHandle;

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// What a data subscription is waiting for, and how to verify it.
pub enum DataExpectation {
    /// A metafile with the given metahash. An empty reply is valid and
    /// means "the sender does not have the file".
    Metafile { metahash: Vec<u8> },
    /// Chunk `index` of the given metafile.
    Chunk { index: usize, metafile: Vec<u8> },
}

/// One-shot subscription for a data reply carrying a specific hash.
pub struct DataSubscription {
    /// Verification to apply before delivering.
    pub expect: DataExpectation,
    /// Fires at most once with the verified payload.
    pub tx: oneshot::Sender<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// All mutable state of a running node.
pub struct NodeState {
    /// Handle back to this node, for spawning sub-protocols from
    /// within loop handlers.
    pub handle: NodeHandle,
    /// The bound gossip socket (safe to send from anywhere).
    pub socket: GossipSocket,
    /// The persistent message log.
    pub store: MessageStore,
    /// Peer address → class.
    pub peers: HashMap<String, PeerClass>,
    /// Origin → next-hop peer address.
    pub routing: HashMap<String, String>,
    /// Files fully present locally.
    pub shared_files: Vec<SharedFile>,
    /// Metahash → descriptor for every file known by share or search.
    pub metafile_db: HashMap<Vec<u8>, FileDescriptor>,
    /// Chunk hash → chunk bytes.
    pub chunk_db: HashMap<Vec<u8>, Vec<u8>>,
    /// Recently seen `(origin, keywords)` search pairs (500 ms window).
    pub pending_searches: Vec<(String, Vec<String>)>,
    /// Replies collected for the currently running client search.
    pub search_results: Vec<SearchReply>,
    /// Peer address → handler awaiting a status packet.
    pub status_subs: HashMap<String, oneshot::Sender<StatusPacket>>,
    /// Chunk/metafile hash → handler awaiting data.
    pub data_subs: HashMap<Vec<u8>, DataSubscription>,
}

impl NodeState {
    /// The node's display name.
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// Encodes and sends a packet, best-effort.
    pub fn send_packet(&self, packet: &GossipPacket, address: &str) {
        self.socket.send(packet, address);
    }

    /// Sends the local vector clock to `address`.
    pub fn send_status(&self, address: &str) {
        match self.build_status() {
            Ok(status) => self.send_packet(&GossipPacket::status(status), address),
            Err(e) => tracing::warn!(%e, "cannot build status packet"),
        }
    }

    /// Builds the local status packet from the store.
    pub fn build_status(&self) -> Result<StatusPacket> {
        let want = self
            .store
            .vector_clock()?
            .into_iter()
            .map(|(identifier, next_id)| PeerStatus {
                identifier,
                next_id,
            })
            .collect();
        Ok(StatusPacket { want })
    }

    /// Rebuilds the wire rumor for a stored `(origin, id)`, if
    /// present. The previous-hop hint is the address the message was
    /// first received from — empty (absent) for locally-originated
    /// messages.
    pub fn build_rumor(&self, origin: &str, id: u32) -> Result<Option<RumorMessage>> {
        Ok(self.store.get(origin, id)?.map(rumor_from_record))
    }

    /// Picks a uniformly random peer not in `exclude`.
    pub fn random_peer(&self, exclude: &[&str]) -> Option<String> {
        let candidates: Vec<&String> = self
            .peers
            .keys()
            .filter(|p| !exclude.contains(&p.as_str()))
            .collect();
        candidates
            .choose(&mut rand::thread_rng())
            .map(|p| (*p).to_string())
    }

    /// The public key announced by `origin` in its `(origin, 0)`
    /// message, if one has been accepted.
    pub fn announced_key_of(&self, origin: &str) -> Result<Option<PublicKey>> {
        match self.store.get(origin, 0)? {
            Some(record) => Ok(announced_key(&record.content).ok()),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------
    // Vector-clock comparison
    // -----------------------------------------------------------------

    /// True if the peer's status lists exactly the same
    /// `(origin, next_id)` pairs as the local store.
    pub fn vector_clock_equals(&self, other: &[PeerStatus]) -> Result<bool> {
        let ours = self.store.vector_clock()?;
        if ours.len() != other.len() {
            return Ok(false);
        }
        let theirs: HashMap<&str, u32> = other
            .iter()
            .map(|s| (s.identifier.as_str(), s.next_id))
            .collect();
        Ok(ours
            .iter()
            .all(|(origin, next)| theirs.get(origin.as_str()) == Some(next)))
    }

    /// Splits the difference between the local clock and a peer's
    /// status into `(peer_behind, we_behind)`:
    ///
    /// - `peer_behind` — origins where we hold messages the peer lacks;
    ///   `next_id` is the first ID the peer still needs.
    /// - `we_behind` — origins where the peer is ahead of us.
    pub fn vector_clock_difference(
        &self,
        other: &[PeerStatus],
    ) -> Result<(Vec<PeerStatus>, Vec<PeerStatus>)> {
        let ours = self.store.vector_clock()?;
        let our_map: HashMap<&str, u32> = ours
            .iter()
            .map(|(origin, next)| (origin.as_str(), *next))
            .collect();

        let mut peer_behind = Vec::new();
        let mut we_behind = Vec::new();
        for status in other {
            let our_next = our_map
                .get(status.identifier.as_str())
                .copied()
                .unwrap_or(0);
            if our_next > status.next_id {
                peer_behind.push(PeerStatus {
                    identifier: status.identifier.clone(),
                    next_id: status.next_id,
                });
            } else if our_next < status.next_id {
                we_behind.push(PeerStatus {
                    identifier: status.identifier.clone(),
                    next_id: our_next,
                });
            }
        }

        let mentioned: HashMap<&str, ()> = other
            .iter()
            .map(|s| (s.identifier.as_str(), ()))
            .collect();
        for (origin, _) in &ours {
            if !mentioned.contains_key(origin.as_str()) {
                peer_behind.push(PeerStatus {
                    identifier: origin.clone(),
                    next_id: 0,
                });
            }
        }

        Ok((peer_behind, we_behind))
    }

    // -----------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------

    /// Saves `content` under the download directory and publishes it:
    /// shared-file list, metafile database and chunk database all
    /// learn about it.
    pub fn add_file(&mut self, name: &str, content: &[u8]) -> Result<SharedFile> {
        rumormill_files::save_file(self.name(), name, content)?;
        let metadata = rumormill_files::build_metadata(name, content);

        self.metafile_db
            .entry(metadata.metahash.clone())
            .or_insert_with(|| {
                FileDescriptor::new(metadata.name.clone(), metadata.metafile.clone())
            });

        for (i, chunk) in content.chunks(rumormill_files::CHUNK_SIZE).enumerate() {
            if let Some(hash) = rumormill_files::chunk_hash(&metadata.metafile, i) {
                self.chunk_db.insert(hash.to_vec(), chunk.to_vec());
            }
        }

        if !self
            .shared_files
            .iter()
            .any(|f| f.name == metadata.name && f.metahash == metadata.metahash)
        {
            self.shared_files.push(metadata.clone());
        }
        Ok(metadata)
    }

    /// Finds a fully-present local file by `(name, metahash)`.
    pub fn get_file_by_name_and_hash(&self, name: &str, metahash: &[u8]) -> Option<&SharedFile> {
        self.shared_files
            .iter()
            .find(|f| f.name == name && f.metahash == metahash)
    }

    /// Rescans the download directory and re-publishes every file.
    /// Called once at startup.
    pub fn initialize_file_database(&mut self) {
        let names = match rumormill_files::list_files(self.name()) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(%e, "cannot scan download directory");
                return;
            }
        };
        for name in names {
            match rumormill_files::load_file(self.name(), &name) {
                Ok(content) => {
                    if let Err(e) = self.add_file(&name, &content) {
                        tracing::warn!(%e, file = %name, "cannot re-share file");
                    }
                }
                Err(e) => tracing::warn!(%e, file = %name, "cannot load shared file"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Record conversion
// ---------------------------------------------------------------------------

/// Rebuilds the wire rumor from a stored record.
pub fn rumor_from_record(record: MessageRecord) -> RumorMessage {
    let previous_hop = if record.from_address.is_empty() {
        None
    } else {
        Some(record.from_address)
    };
    RumorMessage {
        origin: record.origin,
        destination: record.destination,
        id: record.id,
        content: record.content,
        signature: record.signature,
        nonce: record.nonce,
        previous_hop,
    }
}

/// Builds the stored record for a rumor received from `from_address`
/// (empty for locally-originated messages).
pub fn record_from_rumor(msg: &RumorMessage, from_address: &str) -> MessageRecord {
    MessageRecord {
        origin: msg.origin.clone(),
        destination: msg.destination.clone(),
        id: msg.id,
        content: msg.content.clone(),
        signature: msg.signature.clone(),
        nonce: msg.nonce.clone(),
        date_seen: chrono::Utc::now().to_rfc3339(),
        from_address: from_address.to_string(),
    }
}
