//! Chunked file retrieval: metafile fetch and multi-source download.
//!
//! Both sub-protocols follow the same shape: register a one-shot data
//! subscription keyed by the expected hash, send a routed request,
//! and wait with a bounded timeout. Timeouts are the only cancellation
//! mechanism; the retry budgets below bound every download.

use std::time::Duration;

use rand::seq::SliceRandom;
use rumormill_protocol::packet::DataRequest;
use rumormill_protocol::HOP_LIMIT;
use rumormill_types::{Result, RumormillError};
use tokio::sync::oneshot;

use crate::handle::NodeHandle;
use crate::routing::forward_data_request;
use crate::state::{DataExpectation, DataSubscription};

/// How long one metafile request waits before retrying.
const METAFILE_TIMEOUT: Duration = Duration::from_secs(5);

/// Metafile request attempts before giving up.
const METAFILE_RETRIES: u32 = 3;

/// How long one chunk request waits before retrying.
const CHUNK_TIMEOUT: Duration = Duration::from_secs(1);

/// Chunk retry budget for a whole file download.
const CHUNK_RETRY_BUDGET: u32 = 10;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Returns the bytes of `(file_name, metahash)`, downloading the file
/// if it is not already local.
///
/// With `from_peer` empty the download runs in multi-source mode: a
/// prior search must have located every chunk, and each chunk request
/// goes to a random peer believed to hold it.
///
/// # Errors
///
/// Human-readable failures for the front-end: unknown route, missing
/// search results, a peer that does not have the file, or an exhausted
/// retry budget.
pub async fn find_or_retrieve(
    handle: &NodeHandle,
    from_peer: String,
    file_name: String,
    metahash: Vec<u8>,
) -> Result<Vec<u8>> {
    // Already local?
    let local = {
        let file_name = file_name.clone();
        let metahash = metahash.clone();
        handle
            .run_sync(move |state| -> Result<Option<Vec<u8>>> {
                if state.get_file_by_name_and_hash(&file_name, &metahash).is_some() {
                    return rumormill_files::load_file(state.name(), &file_name).map(Some);
                }
                Ok(None)
            })
            .await??
    };
    if let Some(bytes) = local {
        return Ok(bytes);
    }

    // Preconditions that depend on the download mode.
    {
        let from_peer = from_peer.clone();
        let metahash = metahash.clone();
        handle
            .run_sync(move |state| -> Result<()> {
                if from_peer.is_empty() {
                    match state.metafile_db.get(&metahash) {
                        Some(descriptor) if descriptor.has_all_chunks() => Ok(()),
                        Some(_) => Err(RumormillError::NotFound {
                            reason: "the file has been searched but not all chunks \
                                     are available"
                                .into(),
                        }),
                        None => Err(RumormillError::NotFound {
                            reason: "file not found in download pool (consider \
                                     searching it first)"
                                .into(),
                        }),
                    }
                } else if from_peer == state.name() {
                    Err(RumormillError::NotFound {
                        reason: "file not found in local database".into(),
                    })
                } else if !state.routing.contains_key(&from_peer) {
                    Err(RumormillError::NotFound {
                        reason: "the given node does not exist in the routing table".into(),
                    })
                } else {
                    Ok(())
                }
            })
            .await??;
    }

    let metafile = fetch_metafile(handle, &from_peer, &file_name, &metahash).await?;
    let content = download_chunks(handle, &from_peer, &file_name, &metahash, &metafile).await?;

    // Persist, publish and hand back.
    let bytes = {
        let file_name = file_name.clone();
        let content = content.clone();
        handle
            .run_sync(move |state| -> Result<Vec<u8>> {
                state.add_file(&file_name, &content)?;
                tracing::info!("RECONSTRUCTED file {file_name}");
                Ok(content)
            })
            .await??
    };
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Metafile fetch
// ---------------------------------------------------------------------------

/// Retrieves the metafile for `metahash` from `from_peer`, retrying up
/// to three times with a five-second wait each.
///
/// # Errors
///
/// - [`RumormillError::NotFound`] when the peer answers with an empty
///   metafile ("does not have it").
/// - [`RumormillError::Timeout`] when every attempt times out.
pub async fn fetch_metafile(
    handle: &NodeHandle,
    from_peer: &str,
    file_name: &str,
    metahash: &[u8],
) -> Result<Vec<u8>> {
    // Short-circuit if a search already brought the metafile in.
    let known = {
        let metahash = metahash.to_vec();
        handle
            .run_sync(move |state| {
                state
                    .metafile_db
                    .get(&metahash)
                    .map(|descriptor| descriptor.metafile.clone())
            })
            .await?
    };
    if let Some(metafile) = known {
        return Ok(metafile);
    }

    tracing::info!("DOWNLOADING metafile of {file_name} from {from_peer}");
    for _attempt in 0..METAFILE_RETRIES {
        let rx = {
            let metahash = metahash.to_vec();
            let from_peer = from_peer.to_string();
            let file_name = file_name.to_string();
            handle
                .run_sync(move |state| {
                    let (tx, rx) = oneshot::channel();
                    state.data_subs.insert(
                        metahash.clone(),
                        DataSubscription {
                            expect: DataExpectation::Metafile {
                                metahash: metahash.clone(),
                            },
                            tx,
                        },
                    );
                    forward_data_request(
                        state,
                        DataRequest {
                            origin: state.name().to_string(),
                            destination: from_peer,
                            hop_limit: HOP_LIMIT,
                            file_name,
                            hash_value: metahash,
                        },
                    );
                    rx
                })
                .await?
        };

        let outcome = tokio::time::timeout(METAFILE_TIMEOUT, rx).await;
        if let Ok(Ok(metafile)) = outcome {
            let result = {
                let metahash = metahash.to_vec();
                let file_name = file_name.to_string();
                let metafile = metafile.clone();
                handle
                    .run_sync(move |state| {
                        state.data_subs.remove(&metahash);
                        if !metafile.is_empty() {
                            state.metafile_db.entry(metahash).or_insert_with(|| {
                                rumormill_files::FileDescriptor::new(file_name, metafile)
                            });
                        }
                    })
                    .await
            };
            result?;
            if metafile.is_empty() {
                return Err(RumormillError::NotFound {
                    reason: "the destination node does not have the file".into(),
                });
            }
            return Ok(metafile);
        }
        // Timed out (or the subscription was displaced); retry.
    }

    let metahash = metahash.to_vec();
    handle
        .run_sync(move |state| {
            state.data_subs.remove(&metahash);
        })
        .await?;
    Err(RumormillError::Timeout {
        reason: format!(
            "the destination node does not answer (timed out after \
             {METAFILE_RETRIES} retries)"
        ),
    })
}

// ---------------------------------------------------------------------------
// Chunk download
// ---------------------------------------------------------------------------

/// Downloads every chunk of `metafile` in order, verifying each one.
/// A budget of [`CHUNK_RETRY_BUDGET`] timeouts is shared across the
/// whole file.
async fn download_chunks(
    handle: &NodeHandle,
    from_peer: &str,
    file_name: &str,
    metahash: &[u8],
    metafile: &[u8],
) -> Result<Vec<u8>> {
    let num_chunks = rumormill_files::chunk_count(metafile);
    let mut content = Vec::new();
    let mut retries_left = CHUNK_RETRY_BUDGET;

    for index in 0..num_chunks {
        let hash = rumormill_files::chunk_hash(metafile, index)
            .ok_or_else(|| RumormillError::ProtocolError {
                reason: "metafile shorter than its chunk count".into(),
            })?
            .to_vec();

        let data = loop {
            let rx = {
                let hash = hash.clone();
                let metafile = metafile.to_vec();
                let metahash = metahash.to_vec();
                let from_peer = from_peer.to_string();
                let file_name = file_name.to_string();
                handle
                    .run_sync(move |state| -> Result<oneshot::Receiver<Vec<u8>>> {
                        let target = if from_peer.is_empty() {
                            pick_provider(state, &metahash, index)?
                        } else {
                            from_peer
                        };
                        let (tx, rx) = oneshot::channel();
                        state.data_subs.insert(
                            hash.clone(),
                            DataSubscription {
                                expect: DataExpectation::Chunk {
                                    index,
                                    metafile,
                                },
                                tx,
                            },
                        );
                        tracing::info!(
                            "DOWNLOADING {} chunk {} from {}",
                            file_name,
                            index + 1,
                            target,
                        );
                        forward_data_request(
                            state,
                            DataRequest {
                                origin: state.name().to_string(),
                                destination: target,
                                hop_limit: HOP_LIMIT,
                                file_name: String::new(),
                                hash_value: hash,
                            },
                        );
                        Ok(rx)
                    })
                    .await??
            };

            match tokio::time::timeout(CHUNK_TIMEOUT, rx).await {
                Ok(Ok(data)) => break data,
                _ => {
                    retries_left -= 1;
                    if retries_left == 0 {
                        let hash = hash.clone();
                        handle
                            .run_sync(move |state| {
                                state.data_subs.remove(&hash);
                            })
                            .await?;
                        return Err(RumormillError::Timeout {
                            reason: format!(
                                "connection with the destination lost (timed out \
                                 after {CHUNK_RETRY_BUDGET} retries)"
                            ),
                        });
                    }
                }
            }
        };

        {
            let hash = hash.clone();
            let data = data.clone();
            handle
                .run_sync(move |state| {
                    state.data_subs.remove(&hash);
                    state.chunk_db.insert(hash, data);
                })
                .await?;
        }
        content.extend_from_slice(&data);
    }
    Ok(content)
}

/// Picks a random provider for chunk `index` from the descriptor's
/// chunk map.
fn pick_provider(
    state: &crate::state::NodeState,
    metahash: &[u8],
    index: usize,
) -> Result<String> {
    let descriptor = state
        .metafile_db
        .get(metahash)
        .ok_or_else(|| RumormillError::NotFound {
            reason: "metafile disappeared during download".into(),
        })?;
    descriptor
        .chunk_map
        .get(index)
        .and_then(|peers| peers.choose(&mut rand::thread_rng()))
        .cloned()
        .ok_or_else(|| RumormillError::NotFound {
            reason: format!("no known provider for chunk {}", index + 1),
        })
}
