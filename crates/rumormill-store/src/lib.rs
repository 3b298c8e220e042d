//! Persistent message log backed by sled.
//!
//! The log is indexed by primary key `(origin, id)` and is append-only
//! modulo conflict replacement at the same key. Two trees are kept:
//!
//! - `messages` — key `origin_bytes || id(be u32)`, value = CBOR
//!   [`MessageRecord`]. Origins are fixed-width display names, so the
//!   big-endian ID suffix makes a plain prefix scan iterate one
//!   origin's messages in ID order.
//! - `dest_index` — key `destination || 0x00 || origin || id(be u32)`,
//!   empty value. Display names are Base32 ASCII and never contain a
//!   NUL byte, so the separator is unambiguous and the empty
//!   destination ("public") gets its own prefix.
//!
//! [`MessageStore::insert_or_update`] runs as a single sled
//! transaction across both trees followed by a flush, making each
//! insert crash-safe on its own.

pub mod record;

use std::path::Path;

use rumormill_types::{Result, RumormillError};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

pub use record::MessageRecord;

/// Database directory name inside the data directory.
pub const DB_DIR: &str = "messages.db";

/// Persistent, crash-safe message log.
pub struct MessageStore {
    db: sled::Db,
    messages: sled::Tree,
    dest_index: sled::Tree,
}

impl MessageStore {
    /// Opens (or creates) the store under `<data_dir>/messages.db`.
    ///
    /// # Errors
    ///
    /// Returns [`RumormillError::StorageError`] on any sled failure;
    /// fatal at startup.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join(DB_DIR)).map_err(storage_err)?;
        let messages = db.open_tree("messages").map_err(storage_err)?;
        let dest_index = db.open_tree("dest_index").map_err(storage_err)?;
        Ok(Self {
            db,
            messages,
            dest_index,
        })
    }

    /// The next expected ID for `origin`: `max_id + 1`, or 0 if the
    /// origin is unknown.
    pub fn next_id(&self, origin: &str) -> Result<u32> {
        let last = self
            .messages
            .scan_prefix(origin.as_bytes())
            .keys()
            .last()
            .transpose()
            .map_err(storage_err)?;
        match last {
            Some(key) => Ok(id_from_key(&key) + 1),
            None => Ok(0),
        }
    }

    /// The full vector clock: `(origin, next_id)` over all known
    /// origins, in origin order.
    pub fn vector_clock(&self) -> Result<Vec<(String, u32)>> {
        let mut clock: Vec<(String, u32)> = Vec::new();
        for entry in self.messages.iter().keys() {
            let key = entry.map_err(storage_err)?;
            let origin = origin_from_key(&key);
            let next = id_from_key(&key) + 1;
            match clock.last_mut() {
                // Keys arrive sorted, so the running maximum per origin
                // is always the latest entry.
                Some((last_origin, last_next)) if *last_origin == origin => {
                    *last_next = next;
                }
                _ => clock.push((origin, next)),
            }
        }
        Ok(clock)
    }

    /// All origins seen so far, ascending.
    pub fn node_list(&self) -> Result<Vec<String>> {
        Ok(self
            .vector_clock()?
            .into_iter()
            .map(|(origin, _)| origin)
            .collect())
    }

    /// Inserts `record`, deleting any existing row at the same
    /// `(origin, id)` first. Atomic across both trees; flushed before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`RumormillError::StorageError`] on sled failure.
    pub fn insert_or_update(&self, record: &MessageRecord) -> Result<()> {
        let key = message_key(&record.origin, record.id);
        let value = record.to_bytes()?;
        let new_index_key = index_key(&record.destination, &record.origin, record.id);

        (&self.messages, &self.dest_index)
            .transaction(|(messages, dest_index)| {
                if let Some(old_bytes) = messages.get(&key)? {
                    let old = MessageRecord::from_bytes(&old_bytes)
                        .map_err(ConflictableTransactionError::Abort)?;
                    dest_index.remove(index_key(&old.destination, &old.origin, old.id))?;
                }
                messages.insert(key.as_slice(), value.as_slice())?;
                dest_index.insert(new_index_key.as_slice(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Abort(err) => err,
                sled::transaction::TransactionError::Storage(err) => storage_err(err),
            })?;

        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Exact lookup by `(origin, id)`.
    pub fn get(&self, origin: &str, id: u32) -> Result<Option<MessageRecord>> {
        let bytes = self
            .messages
            .get(message_key(origin, id))
            .map_err(storage_err)?;
        bytes.map(|b| MessageRecord::from_bytes(&b)).transpose()
    }

    /// All messages addressed to `destination` (`""` = public),
    /// ordered by `date_seen` ascending.
    pub fn messages_to(&self, destination: &str) -> Result<Vec<MessageRecord>> {
        let mut prefix = Vec::with_capacity(destination.len() + 1);
        prefix.extend_from_slice(destination.as_bytes());
        prefix.push(0x00);

        let mut records = Vec::new();
        for entry in self.dest_index.scan_prefix(&prefix).keys() {
            let key = entry.map_err(storage_err)?;
            let (origin, id) = origin_id_from_index_key(&key, destination.len());
            if let Some(record) = self.get(&origin, id)? {
                records.push(record);
            }
        }
        sort_by_date_seen(&mut records);
        Ok(records)
    }

    /// The conversation between `a` and `b`: messages in either
    /// direction, ordered by `date_seen` ascending.
    pub fn conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>> {
        let mut records: Vec<MessageRecord> = self
            .messages_to(b)?
            .into_iter()
            .filter(|r| r.origin == a)
            .chain(self.messages_to(a)?.into_iter().filter(|r| r.origin == b))
            .collect();
        sort_by_date_seen(&mut records);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Key layout helpers
// ---------------------------------------------------------------------------

fn message_key(origin: &str, id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(origin.len() + 4);
    key.extend_from_slice(origin.as_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn index_key(destination: &str, origin: &str, id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(destination.len() + 1 + origin.len() + 4);
    key.extend_from_slice(destination.as_bytes());
    key.push(0x00);
    key.extend_from_slice(origin.as_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn id_from_key(key: &[u8]) -> u32 {
    let mut id = [0u8; 4];
    id.copy_from_slice(&key[key.len() - 4..]);
    u32::from_be_bytes(id)
}

fn origin_from_key(key: &[u8]) -> String {
    String::from_utf8_lossy(&key[..key.len() - 4]).into_owned()
}

fn origin_id_from_index_key(key: &[u8], dest_len: usize) -> (String, u32) {
    let origin = String::from_utf8_lossy(&key[dest_len + 1..key.len() - 4]).into_owned();
    (origin, id_from_key(key))
}

fn sort_by_date_seen(records: &mut [MessageRecord]) {
    records.sort_by(|a, b| a.date_seen_parsed().cmp(&b.date_seen_parsed()));
}

fn storage_err(e: sled::Error) -> RumormillError {
    RumormillError::StorageError {
        reason: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
