//! The gossip packet union and point-to-point packet types.
//!
//! [`GossipPacket`] is a discriminated union with one optional field
//! per packet kind; exactly one field is set in a well-formed packet.
//! Unknown fields are ignored on decode, which gives the wire format
//! its forward compatibility.

use serde::{Deserialize, Serialize};

use crate::rumor::RumorMessage;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// One entry of a vector clock: the smallest ID not yet seen from an
/// origin.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeerStatus {
    /// Origin display name.
    pub identifier: String,
    /// Smallest unseen ID (`max_id + 1`).
    pub next_id: u32,
}

/// The sender's full vector clock; doubles as the acknowledgement for
/// rumor-mongering.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StatusPacket {
    /// One entry per known origin.
    pub want: Vec<PeerStatus>,
}

// ---------------------------------------------------------------------------
// Data request / reply
// ---------------------------------------------------------------------------

/// Routed request for a metafile (`file_name` non-empty) or a chunk
/// (`file_name` empty, `hash_value` is the chunk hash).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    /// Requesting node's display name.
    pub origin: String,
    /// Display name of the node expected to hold the data.
    pub destination: String,
    /// Remaining hops; decremented at every forwarding node.
    pub hop_limit: u32,
    /// File name for metafile requests, empty for chunk requests.
    #[serde(default)]
    pub file_name: String,
    /// Metahash or chunk hash being requested.
    pub hash_value: Vec<u8>,
}

/// Routed reply carrying a metafile or chunk.
///
/// An empty `data` field on a metafile reply means "I do not have this
/// file".
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataReply {
    /// Replying node's display name.
    pub origin: String,
    /// The original requester.
    pub destination: String,
    /// Remaining hops.
    pub hop_limit: u32,
    /// Echoed file name (metafile replies only).
    #[serde(default)]
    pub file_name: String,
    /// Hash the data must verify against.
    pub hash_value: Vec<u8>,
    /// Metafile or chunk bytes.
    #[serde(default)]
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Search request / reply
// ---------------------------------------------------------------------------

/// Flooded keyword search with a split budget.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Searching node's display name.
    pub origin: String,
    /// Remaining credit; split across forwards.
    pub budget: u64,
    /// Keywords matched as substrings of file names.
    pub keywords: Vec<String>,
}

/// One matching file at the replying node.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Name of the matching file.
    pub file_name: String,
    /// The file's metahash.
    pub metafile_hash: Vec<u8>,
    /// 1-based indices of the chunks held by the replying node.
    pub chunk_map: Vec<u64>,
}

/// Routed reply aggregating the matches at one node.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchReply {
    /// Replying node's display name.
    pub origin: String,
    /// The original searcher.
    pub destination: String,
    /// Remaining hops.
    pub hop_limit: u32,
    /// All local matches.
    pub results: Vec<SearchResult>,
}

// ---------------------------------------------------------------------------
// GossipPacket
// ---------------------------------------------------------------------------

/// The wire envelope: exactly one field is set per packet.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GossipPacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rumor: Option<RumorMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusPacket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_request: Option<DataRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_reply: Option<DataReply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_request: Option<SearchRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_reply: Option<SearchReply>,
}

impl GossipPacket {
    /// Wraps a rumor.
    pub fn rumor(msg: RumorMessage) -> Self {
        Self {
            rumor: Some(msg),
            ..Self::default()
        }
    }

    /// Wraps a status packet.
    pub fn status(status: StatusPacket) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Wraps a data request.
    pub fn data_request(req: DataRequest) -> Self {
        Self {
            data_request: Some(req),
            ..Self::default()
        }
    }

    /// Wraps a data reply.
    pub fn data_reply(reply: DataReply) -> Self {
        Self {
            data_reply: Some(reply),
            ..Self::default()
        }
    }

    /// Wraps a search request.
    pub fn search_request(req: SearchRequest) -> Self {
        Self {
            search_request: Some(req),
            ..Self::default()
        }
    }

    /// Wraps a search reply.
    pub fn search_reply(reply: SearchReply) -> Self {
        Self {
            search_reply: Some(reply),
            ..Self::default()
        }
    }
}
