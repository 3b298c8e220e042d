//! Two-node integration tests over real loopback sockets.
//!
//! Proof-of-work difficulty is lowered to one bit so composition is
//! instant; timeouts are generous because propagation rides the
//! one-second anti-entropy tick.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use rumormill_node::{compose, download, Node};
use rumormill_types::config::AppConfig;

/// The download directory is relative to the working directory, so
/// every test runs chdir'ed into its own tempdir, serialised by this
/// lock.
static CWD_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

async fn start_node(peers: Vec<String>, data_dir: &Path) -> Node {
    Node::start(AppConfig {
        gossip_addr: "127.0.0.1:0".into(),
        ui_port: None,
        peers,
        rtimer_secs: 2,
        no_forward: false,
        disable_traversal: false,
        data_dir: data_dir.to_path_buf(),
        pow_difficulty: 1,
    })
    .await
    .expect("node start")
}

/// Polls `check` until it returns true or `secs` elapse.
async fn wait_until<F, Fut>(secs: u64, check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(secs);
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

/// Polls node `handle` until `check` on its state returns true.
async fn wait_on_state<F>(node: &Node, secs: u64, check: F) -> bool
where
    F: Fn(&mut rumormill_node::state::NodeState) -> bool + Clone + Send + 'static,
{
    let handle = node.handle.clone();
    wait_until(secs, || {
        let handle = handle.clone();
        let check = check.clone();
        async move { handle.run_sync(move |state| check(state)).await.unwrap_or(false) }
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn public_message_propagates_between_two_nodes() {
    let _cwd = CWD_LOCK.lock().await;
    let workdir = tempfile::tempdir().expect("workdir");
    std::env::set_current_dir(workdir.path()).expect("chdir");

    let dir_a = tempfile::tempdir().expect("dir a");
    let dir_b = tempfile::tempdir().expect("dir b");

    let node_b = start_node(Vec::new(), dir_b.path()).await;
    let node_a = start_node(vec![node_b.gossip_addr().to_string()], dir_a.path()).await;
    let a_name = node_a.handle.name.clone();

    compose::send_message(&node_a.handle, "hello".into(), String::new())
        .await
        .expect("send message");

    // B must end up with A's full log — key announcement, startup
    // route rumor and the text message — as a dense ID prefix.
    let expected_name = a_name.clone();
    let converged = wait_on_state(&node_b, 15, move |state| {
        let next = state.store.next_id(&expected_name).unwrap_or(0);
        next >= 3
            && (0..next).all(|id| {
                state
                    .store
                    .get(&expected_name, id)
                    .ok()
                    .flatten()
                    .is_some()
            })
    })
    .await;
    assert!(converged, "node B never received node A's log");

    let filter_name = a_name.clone();
    let contents = node_b
        .handle
        .run_sync(move |state| {
            state
                .store
                .messages_to("")
                .expect("messages")
                .into_iter()
                .filter(|r| r.origin == filter_name)
                .map(|r| r.content)
                .collect::<Vec<_>>()
        })
        .await
        .expect("run_sync");
    assert!(
        contents.iter().any(|c| c == b"hello"),
        "text message missing from node B's public log"
    );

    // Clocks agree on A's next ID.
    let name_b = a_name.clone();
    let next_on_b = node_b
        .handle
        .run_sync(move |state| state.store.next_id(&name_b).unwrap_or(0))
        .await
        .expect("run_sync");
    let name_a = a_name.clone();
    let next_on_a = node_a
        .handle
        .run_sync(move |state| state.store.next_id(&name_a).unwrap_or(0))
        .await
        .expect("run_sync");
    assert_eq!(next_on_a, next_on_b);
}

#[tokio::test(flavor = "multi_thread")]
async fn three_chunk_file_round_trips_between_nodes() {
    let _cwd = CWD_LOCK.lock().await;
    let workdir = tempfile::tempdir().expect("workdir");
    std::env::set_current_dir(workdir.path()).expect("chdir");

    let dir_a = tempfile::tempdir().expect("dir a");
    let dir_b = tempfile::tempdir().expect("dir b");

    let node_a = start_node(Vec::new(), dir_a.path()).await;
    let node_b = start_node(vec![node_a.gossip_addr().to_string()], dir_b.path()).await;
    let a_name = node_a.handle.name.clone();
    let b_name = node_b.handle.name.clone();

    // A shares a 20 000-byte file (three chunks).
    let content: Vec<u8> = (0..20_000u32).map(|i| (i % 241) as u8).collect();
    let shared = {
        let content = content.clone();
        node_a
            .handle
            .run_sync(move |state| state.add_file("testdoc.bin", &content))
            .await
            .expect("run_sync")
            .expect("add_file")
    };

    // Both directions need routes before the download can start: B
    // addresses A, and A's replies route back to B.
    let route_to_a = a_name.clone();
    assert!(
        wait_on_state(&node_b, 15, move |state| state
            .routing
            .contains_key(&route_to_a))
        .await,
        "node B never learned a route to node A"
    );
    let route_to_b = b_name.clone();
    assert!(
        wait_on_state(&node_a, 15, move |state| state
            .routing
            .contains_key(&route_to_b))
        .await,
        "node A never learned a route to node B"
    );

    let downloaded = download::find_or_retrieve(
        &node_b.handle,
        a_name,
        "testdoc.bin".into(),
        shared.metahash.clone(),
    )
    .await
    .expect("download");
    assert_eq!(downloaded, content);

    // The reconstructed file is persisted under B's download dir.
    let on_disk =
        rumormill_files::load_file(&b_name, "testdoc.bin").expect("reconstructed file on disk");
    assert_eq!(on_disk, content);
}
