//! HTTP front-end for a rumormill node.
//!
//! JSON endpoints with permissive CORS, plus a multipart upload, a
//! byte-streaming download and a line-streaming search. Every handler
//! reaches the node through [`NodeHandle::run_sync`], so state access
//! stays serialised on the event loop.

pub mod dto;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use rumormill_node::state::rumor_from_record;
use rumormill_node::{compose, download, search, NodeHandle};
use rumormill_types::{PeerClass, Result, RumormillError};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dto::{
    DownloadForm, MessageLogEntry, OutgoingPrivateMessage, PeerEntry, RouteEntry, SearchBody,
};

/// Upload size cap (64 MiB).
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Capacity of the search progress-line channel.
const SEARCH_CHANNEL_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct ApiState {
    handle: NodeHandle,
}

/// Builds the full API router.
pub fn router(handle: NodeHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/message", get(get_messages).post(post_message))
        .route("/node", get(get_nodes).post(post_node))
        .route("/id", get(get_id))
        .route("/routes", get(get_routes))
        .route(
            "/privateMessage",
            get(get_private_messages).post(post_private_message),
        )
        .route("/upload", post(upload_file))
        .route("/download", post(download_file))
        .route("/search", post(search_files))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { handle })
}

/// Binds `127.0.0.1:<port>` and serves until the process exits.
///
/// # Errors
///
/// Returns [`RumormillError::NetworkError`] if the port cannot be
/// bound; fatal at startup.
pub async fn serve(handle: NodeHandle, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| RumormillError::NetworkError {
            reason: format!("cannot bind HTTP port {port}: {e}"),
        })?;
    tracing::info!(port, "HTTP front-end listening");
    axum::serve(listener, router(handle))
        .await
        .map_err(|e| RumormillError::NetworkError {
            reason: format!("HTTP server failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Error plumbing
// ---------------------------------------------------------------------------

/// Internal-failure response: anything that is not the caller's fault
/// maps to a 500 with the human-readable reason.
struct Internal(RumormillError);

impl From<RumormillError> for Internal {
    fn from(e: RumormillError) -> Self {
        Self(e)
    }
}

impl IntoResponse for Internal {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

fn bad_request(reason: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, reason.into()).into_response()
}

// ---------------------------------------------------------------------------
// /message
// ---------------------------------------------------------------------------

async fn get_messages(State(api): State<ApiState>) -> std::result::Result<Response, Internal> {
    let entries = api
        .handle
        .run_sync(|state| -> Result<Vec<MessageLogEntry>> {
            let records = state.store.messages_to("")?;
            Ok(records
                .into_iter()
                .map(|record| MessageLogEntry {
                    first_seen: record.date_seen.clone(),
                    from_node: record.origin.clone(),
                    seq_id: record.id,
                    from_address: record.from_address.clone(),
                    content: compose::display_content(state, &record),
                    hash: hex::encode(rumor_from_record(record).compute_hash()),
                })
                .collect())
        })
        .await??;
    Ok(Json(entries).into_response())
}

async fn post_message(State(api): State<ApiState>, body: String) -> Response {
    let text: String = match serde_json::from_str(&body) {
        Ok(text) => text,
        Err(_) => return bad_request("body must be a JSON string"),
    };
    tracing::info!("MESSAGE FROM CLIENT: {text}");
    match compose::send_message(&api.handle, text, String::new()).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => Internal(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// /node
// ---------------------------------------------------------------------------

async fn get_nodes(State(api): State<ApiState>) -> std::result::Result<Response, Internal> {
    let peers = api
        .handle
        .run_sync(|state| {
            let mut peers: Vec<PeerEntry> = state
                .peers
                .iter()
                .map(|(address, class)| PeerEntry {
                    address: address.clone(),
                    r#type: *class as u8,
                })
                .collect();
            peers.sort_by(|a, b| a.address.cmp(&b.address));
            peers
        })
        .await?;
    Ok(Json(peers).into_response())
}

async fn post_node(State(api): State<ApiState>, body: String) -> Response {
    let peer: String = match serde_json::from_str(&body) {
        Ok(peer) => peer,
        Err(_) => return bad_request("body must be a JSON string"),
    };
    let resolved = match rumormill_net::resolve_address(&peer) {
        Ok(resolved) => resolved,
        Err(e) => return bad_request(e.to_string()),
    };
    let outcome = api
        .handle
        .run_sync(move |state| {
            if resolved == state.socket.local_addr() {
                return Err(RumormillError::ConfigError {
                    reason: "a node cannot peer with itself".into(),
                });
            }
            // Toggle: present → remove, absent → add as manual.
            if state.peers.remove(&resolved).is_none() {
                state.peers.insert(resolved, PeerClass::Manual);
            }
            Ok(())
        })
        .await;
    match outcome {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => bad_request(e.to_string()),
        Err(e) => Internal(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// /id and /routes
// ---------------------------------------------------------------------------

async fn get_id(State(api): State<ApiState>) -> Response {
    // Renaming is not possible: the name is derived from the key.
    Json(api.handle.name.clone()).into_response()
}

async fn get_routes(State(api): State<ApiState>) -> std::result::Result<Response, Internal> {
    let routes = api
        .handle
        .run_sync(|state| {
            let mut routes: Vec<RouteEntry> = state
                .routing
                .iter()
                .map(|(origin, address)| RouteEntry {
                    origin: origin.clone(),
                    address: address.clone(),
                })
                .collect();
            routes.sort_by(|a, b| a.origin.cmp(&b.origin));
            routes
        })
        .await?;
    Ok(Json(routes).into_response())
}

// ---------------------------------------------------------------------------
// /privateMessage
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PrivateQuery {
    #[serde(default)]
    name: String,
}

async fn get_private_messages(
    State(api): State<ApiState>,
    Query(query): Query<PrivateQuery>,
) -> std::result::Result<Response, Internal> {
    let entries = api
        .handle
        .run_sync(move |state| -> Result<Vec<MessageLogEntry>> {
            let name = state.name().to_string();
            let records = state.store.conversation(&name, &query.name)?;
            Ok(records
                .into_iter()
                .map(|record| MessageLogEntry {
                    first_seen: record.date_seen.clone(),
                    from_node: record.origin.clone(),
                    seq_id: record.id,
                    from_address: record.from_address.clone(),
                    content: compose::display_content(state, &record),
                    hash: hex::encode(rumor_from_record(record).compute_hash()),
                })
                .collect())
        })
        .await??;
    Ok(Json(entries).into_response())
}

async fn post_private_message(State(api): State<ApiState>, body: String) -> Response {
    let msg: OutgoingPrivateMessage = match serde_json::from_str(&body) {
        Ok(msg) => msg,
        Err(_) => return bad_request("body must be {Destination, Content}"),
    };
    if msg.destination.is_empty() {
        return bad_request("destination must not be empty");
    }
    tracing::info!("PRIVATE SEND \"{}\" TO {}", msg.content, msg.destination);
    match compose::send_message(&api.handle, msg.content, msg.destination).await {
        Ok(_) => StatusCode::OK.into_response(),
        // Typically: the destination has never announced a key.
        Err(e @ RumormillError::NotFound { .. }) => bad_request(e.to_string()),
        Err(e) => Internal(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// /upload and /download
// ---------------------------------------------------------------------------

async fn upload_file(State(api): State<ApiState>, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("uploadedFile") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.bin").to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(_) => return bad_request("malformed multipart body"),
        };
        tracing::info!("FILE UPLOAD {} size {}", file_name, data.len());
        let outcome = api
            .handle
            .run_sync(move |state| state.add_file(&file_name, &data))
            .await;
        return match outcome {
            Ok(Ok(_)) => (StatusCode::OK, "File uploaded correctly").into_response(),
            Ok(Err(e)) => Internal(e).into_response(),
            Err(e) => Internal(e).into_response(),
        };
    }
    bad_request("missing 'uploadedFile' field")
}

async fn download_file(State(api): State<ApiState>, Form(form): Form<DownloadForm>) -> Response {
    let metahash = match hex::decode(&form.file_hash) {
        Ok(hash) => hash,
        Err(_) => return bad_request("invalid file hash"),
    };
    match download::find_or_retrieve(&api.handle, form.file_peer, form.file_name.clone(), metahash)
        .await
    {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// /search
// ---------------------------------------------------------------------------

async fn search_files(State(api): State<ApiState>, body: String) -> Response {
    let body: SearchBody = match serde_json::from_str(&body) {
        Ok(body) => body,
        Err(_) => return bad_request("body must be {Keywords, Budget}"),
    };
    let keywords = body.keyword_list();
    if keywords.is_empty() {
        return bad_request("at least one keyword is required");
    }

    let (tx, rx) = mpsc::channel::<String>(SEARCH_CHANNEL_SIZE);
    search::spawn_client_search(api.handle.clone(), keywords, body.budget_value(), tx);

    // Stream progress lines until the search task closes the channel.
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok::<_, std::convert::Infallible>(Bytes::from(line + "\n")), rx))
    });
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response()
}
