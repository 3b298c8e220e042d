//! Node assembly and startup.

use std::collections::HashMap;
use std::sync::Arc;

use rumormill_crypto::keys::Keypair;
use rumormill_crypto::name::derive_name;
use rumormill_net::{resolve_address, GossipSocket};
use rumormill_store::MessageStore;
use rumormill_types::config::AppConfig;
use rumormill_types::{PeerClass, Result};
use tokio::sync::mpsc;

use crate::compose;
use crate::event_loop::run_event_loop;
use crate::handle::NodeHandle;
use crate::state::NodeState;

/// Capacity of the event-loop work queue.
const TASK_QUEUE_SIZE: usize = 64;

/// A running rumormill node.
///
/// Dropping the `Node` does not stop the loop; the handle keeps it
/// alive as long as the socket receiver runs.
pub struct Node {
    /// Capability used by front-ends and tests to reach the loop.
    pub handle: NodeHandle,
    gossip_addr: String,
}

impl Node {
    /// Assembles and starts a node: loads the identity, opens the
    /// store, binds the socket, inserts the key announcement, rescans
    /// the download directory and spawns the event loop.
    ///
    /// # Errors
    ///
    /// Any failure here is a fatal init error: bad configuration,
    /// unreadable key file, unopenable store, unbindable socket or an
    /// unresolvable initial peer.
    pub async fn start(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let keypair = Arc::new(Keypair::load_or_generate(&config.data_dir)?);
        let name = derive_name(&keypair.public_key()).as_str().to_string();
        tracing::info!("the display name of this node is: {name}");

        let store = MessageStore::open(&config.data_dir)?;
        let socket = GossipSocket::bind(&config.gossip_addr).await?;
        let gossip_addr = socket.local_addr().to_string();
        let inbound = socket.spawn_receiver();

        let mut peers = HashMap::new();
        for peer in &config.peers {
            let resolved = resolve_address(peer)?;
            peers.insert(resolved, PeerClass::Manual);
        }

        let (task_tx, task_rx) = mpsc::channel(TASK_QUEUE_SIZE);
        let handle = NodeHandle::new(task_tx, keypair, name, Arc::clone(&config));

        let mut state = NodeState {
            handle: handle.clone(),
            socket,
            store,
            peers,
            routing: HashMap::new(),
            shared_files: Vec::new(),
            metafile_db: HashMap::new(),
            chunk_db: HashMap::new(),
            pending_searches: Vec::new(),
            search_results: Vec::new(),
            status_subs: HashMap::new(),
            data_subs: HashMap::new(),
        };

        compose::insert_key_announcement(&mut state)?;
        state.initialize_file_database();

        tokio::spawn(run_event_loop(state, task_rx, inbound));

        Ok(Self {
            handle,
            gossip_addr,
        })
    }

    /// The canonical address the gossip socket is bound to.
    pub fn gossip_addr(&self) -> &str {
        &self.gossip_addr
    }
}
