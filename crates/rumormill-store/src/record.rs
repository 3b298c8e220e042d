//! The stored form of a message.

use chrono::{DateTime, Utc};
use rumormill_types::{Result, RumormillError};
use serde::{Deserialize, Serialize};

/// One row of the message log.
///
/// Mirrors the wire rumor plus bookkeeping: when the message was first
/// seen and from which socket address. `from_address` is empty for
/// locally-originated messages — that emptiness is what tells
/// receivers of a re-broadcast that the rumor came straight from its
/// origin (direct-route detection).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub origin: String,
    pub destination: String,
    pub id: u32,
    pub content: Vec<u8>,
    pub signature: Vec<u8>,
    pub nonce: Vec<u8>,
    /// RFC 3339 timestamp of first local acceptance.
    pub date_seen: String,
    /// Socket address the rumor arrived from; empty if local.
    pub from_address: String,
}

impl MessageRecord {
    /// Serializes the record for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| RumormillError::StorageError {
            reason: format!("record encoding failed: {e}"),
        })?;
        Ok(buf)
    }

    /// Deserializes a stored record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| RumormillError::StorageError {
            reason: format!("record decoding failed: {e}"),
        })
    }

    /// Parses `date_seen`; records with an unparsable timestamp sort
    /// first.
    pub fn date_seen_parsed(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.date_seen)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() -> Result<()> {
        let record = MessageRecord {
            origin: "aaaaaaaaaaaaaaaa".into(),
            destination: String::new(),
            id: 5,
            content: b"payload".to_vec(),
            signature: vec![1; 64],
            nonce: vec![2; 16],
            date_seen: Utc::now().to_rfc3339(),
            from_address: "127.0.0.1:5000".into(),
        };
        let decoded = MessageRecord::from_bytes(&record.to_bytes()?)?;
        assert_eq!(record, decoded);
        Ok(())
    }

    #[test]
    fn unparsable_date_sorts_first() {
        let record = MessageRecord {
            origin: String::new(),
            destination: String::new(),
            id: 0,
            content: Vec::new(),
            signature: Vec::new(),
            nonce: Vec::new(),
            date_seen: "garbage".into(),
            from_address: String::new(),
        };
        assert_eq!(record.date_seen_parsed(), DateTime::<Utc>::MIN_UTC);
    }
}
