//! JSON shapes of the HTTP API.
//!
//! Field names are PascalCase on the wire; that is what the web client
//! and the one-shot CLI client send and expect.

use serde::{Deserialize, Serialize};

/// One entry of the message log as shown to clients.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageLogEntry {
    /// RFC 3339 timestamp of first local acceptance.
    pub first_seen: String,
    /// Origin display name.
    pub from_node: String,
    /// Sequence number within the origin's stream.
    #[serde(rename = "SeqID")]
    pub seq_id: u32,
    /// Socket address the message arrived from (empty if local).
    pub from_address: String,
    /// Rendered content (decrypted, or a placeholder).
    pub content: String,
    /// Hex SHA-256 of the full message.
    pub hash: String,
}

/// One peer-set entry (`Type` is the numeric peer class).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeerEntry {
    pub address: String,
    pub r#type: u8,
}

/// One routing-table entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteEntry {
    pub origin: String,
    pub address: String,
}

/// Body of `POST /privateMessage`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutgoingPrivateMessage {
    pub destination: String,
    pub content: String,
}

/// Body of `POST /search`. `Budget` arrives as a number or a numeric
/// string depending on the client.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchBody {
    pub keywords: String,
    #[serde(default)]
    pub budget: serde_json::Value,
}

impl SearchBody {
    /// Keywords split on commas, empties dropped.
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The budget as an integer; malformed or absent means 0
    /// (expanding-ring search).
    pub fn budget_value(&self) -> u64 {
        match &self.budget {
            serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
            serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

/// Form body of `POST /download`.
#[derive(Clone, Debug, Deserialize)]
pub struct DownloadForm {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileHash")]
    pub file_hash: String,
    #[serde(rename = "filePeer", default)]
    pub file_peer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_budget_accepts_number_and_string() {
        let body: SearchBody =
            serde_json::from_str(r#"{"Keywords":"a,b","Budget":4}"#).expect("number");
        assert_eq!(body.budget_value(), 4);
        assert_eq!(body.keyword_list(), vec!["a", "b"]);

        let body: SearchBody =
            serde_json::from_str(r#"{"Keywords":"doc","Budget":"8"}"#).expect("string");
        assert_eq!(body.budget_value(), 8);
    }

    #[test]
    fn search_budget_defaults_to_expanding() {
        let body: SearchBody = serde_json::from_str(r#"{"Keywords":"doc"}"#).expect("absent");
        assert_eq!(body.budget_value(), 0);
    }

    #[test]
    fn empty_keywords_are_dropped() {
        let body: SearchBody =
            serde_json::from_str(r#"{"Keywords":"a,,  ,b","Budget":1}"#).expect("parse");
        assert_eq!(body.keyword_list(), vec!["a", "b"]);
    }

    #[test]
    fn message_log_entry_serialises_pascal_case() {
        let entry = MessageLogEntry {
            first_seen: "2026-01-01T00:00:00+00:00".into(),
            from_node: "aaaaaaaaaaaaaaaa".into(),
            seq_id: 1,
            from_address: String::new(),
            content: "hi".into(),
            hash: "00".into(),
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains("\"FirstSeen\""));
        assert!(json.contains("\"SeqID\""));
    }
}
