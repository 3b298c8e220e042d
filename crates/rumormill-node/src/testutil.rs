//! Shared fixtures for the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Arc;

use rumormill_crypto::keys::Keypair;
use rumormill_crypto::name::derive_name;
use rumormill_net::GossipSocket;
use rumormill_protocol::pow::compute_nonce;
use rumormill_protocol::rumor::{RumorMessage, NONCE_LEN};
use rumormill_store::MessageStore;
use rumormill_types::config::AppConfig;
use tokio::sync::mpsc;

use crate::handle::{NodeHandle, Task};
use crate::state::NodeState;

/// Proof-of-work difficulty used throughout the unit tests.
pub const POW: u32 = 4;

/// A node state plus the resources that must stay alive with it.
pub struct TestNode {
    pub state: NodeState,
    /// Kept open so `run_sync` calls from spawned sub-tasks do not
    /// error out mid-test; nothing drains it.
    pub _task_rx: mpsc::Receiver<Task>,
    pub _dir: tempfile::TempDir,
}

/// Builds a fully wired state with a real bound socket, a temp-dir
/// store and test difficulty, without running the event loop.
pub async fn test_node() -> TestNode {
    let dir = tempfile::tempdir().expect("tempdir");
    let keypair = Arc::new(Keypair::from_seed(&[0xC4; 32]));
    let name = derive_name(&keypair.public_key()).as_str().to_string();
    let config = Arc::new(AppConfig {
        gossip_addr: "127.0.0.1:0".into(),
        data_dir: dir.path().to_path_buf(),
        pow_difficulty: POW,
        ..AppConfig::default()
    });

    let socket = GossipSocket::bind("127.0.0.1:0").await.expect("bind");
    let store = MessageStore::open(dir.path()).expect("open store");
    let (task_tx, task_rx) = mpsc::channel(64);
    let handle = NodeHandle::new(task_tx, keypair, name, config);

    let state = NodeState {
        handle,
        socket,
        store,
        peers: HashMap::new(),
        routing: HashMap::new(),
        shared_files: Vec::new(),
        metafile_db: HashMap::new(),
        chunk_db: HashMap::new(),
        pending_searches: Vec::new(),
        search_results: Vec::new(),
        status_subs: HashMap::new(),
        data_subs: HashMap::new(),
    };
    TestNode {
        state,
        _task_rx: task_rx,
        _dir: dir,
    }
}

/// A mined key announcement for `kp`.
pub fn announcement(kp: &Keypair) -> RumorMessage {
    let mut msg = RumorMessage {
        origin: derive_name(&kp.public_key()).as_str().to_string(),
        destination: String::new(),
        id: 0,
        content: kp.public_key().as_bytes().to_vec(),
        signature: Vec::new(),
        nonce: vec![0u8; NONCE_LEN],
        previous_hop: None,
    };
    compute_nonce(&mut msg, POW);
    msg
}

/// Publishes `content` into the state's in-memory file databases
/// without touching the download directory on disk.
pub fn register_file(state: &mut NodeState, name: &str, content: &[u8]) {
    let metadata = rumormill_files::build_metadata(name, content);
    for (i, chunk) in content.chunks(rumormill_files::CHUNK_SIZE).enumerate() {
        if let Some(hash) = rumormill_files::chunk_hash(&metadata.metafile, i) {
            state.chunk_db.insert(hash.to_vec(), chunk.to_vec());
        }
    }
    state.metafile_db.insert(
        metadata.metahash.clone(),
        rumormill_files::FileDescriptor::new(metadata.name.clone(), metadata.metafile.clone()),
    );
    state.shared_files.push(metadata);
}

/// A signed and mined rumor from `kp`.
pub fn signed_rumor(kp: &Keypair, id: u32, content: &[u8], destination: &str) -> RumorMessage {
    let mut msg = RumorMessage {
        origin: derive_name(&kp.public_key()).as_str().to_string(),
        destination: destination.to_string(),
        id,
        content: content.to_vec(),
        signature: Vec::new(),
        nonce: vec![0u8; NONCE_LEN],
        previous_hop: None,
    };
    msg.signature = kp.sign(&msg.payload()).as_bytes().to_vec();
    compute_nonce(&mut msg, POW);
    msg
}
