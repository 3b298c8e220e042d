//! Shared-file descriptors.

/// A file fully present locally.
#[derive(Clone, Debug)]
pub struct SharedFile {
    /// File name as shared on the network.
    pub name: String,
    /// Total size in bytes.
    pub size: usize,
    /// Concatenated SHA-256 chunk hashes.
    pub metafile: Vec<u8>,
    /// SHA-256 of the metafile; the file's external identifier.
    pub metahash: Vec<u8>,
}

/// A file known by search but not necessarily complete.
///
/// `chunk_map[i]` lists the peers believed to hold chunk `i`
/// (0-based here; the wire carries 1-based indices).
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    /// File name reported by the search result.
    pub name: String,
    /// The file's metafile.
    pub metafile: Vec<u8>,
    /// Per-chunk provider lists.
    pub chunk_map: Vec<Vec<String>>,
}

impl FileDescriptor {
    /// Builds a descriptor with an empty provider list per chunk.
    pub fn new(name: String, metafile: Vec<u8>) -> Self {
        let chunks = crate::chunk_count(&metafile);
        Self {
            name,
            metafile,
            chunk_map: vec![Vec::new(); chunks],
        }
    }

    /// True if at least one peer is believed to hold chunk `index`.
    pub fn has_chunk(&self, index: usize) -> bool {
        self.chunk_map
            .get(index)
            .is_some_and(|peers| !peers.is_empty())
    }

    /// True if every chunk has at least one known provider, i.e. the
    /// file is downloadable.
    pub fn has_all_chunks(&self) -> bool {
        !self.chunk_map.is_empty() && (0..self.chunk_map.len()).all(|i| self.has_chunk(i))
    }

    /// Records that `peer` holds chunk `index`. Duplicate entries are
    /// ignored; out-of-range indices are dropped.
    pub fn add_chunk(&mut self, index: usize, peer: &str) {
        if let Some(peers) = self.chunk_map.get_mut(index) {
            if !peers.iter().any(|p| p == peer) {
                peers.push(peer.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(chunks: usize) -> FileDescriptor {
        FileDescriptor::new("doc.bin".into(), vec![0u8; chunks * 32])
    }

    #[test]
    fn fresh_descriptor_has_no_chunks() {
        let d = descriptor(3);
        assert!(!d.has_chunk(0));
        assert!(!d.has_all_chunks());
    }

    #[test]
    fn all_chunks_requires_every_index() {
        let mut d = descriptor(2);
        d.add_chunk(0, "peer-a");
        assert!(!d.has_all_chunks());
        d.add_chunk(1, "peer-b");
        assert!(d.has_all_chunks());
    }

    #[test]
    fn add_chunk_deduplicates() {
        let mut d = descriptor(1);
        d.add_chunk(0, "peer-a");
        d.add_chunk(0, "peer-a");
        assert_eq!(d.chunk_map[0].len(), 1);
    }

    #[test]
    fn out_of_range_chunk_ignored() {
        let mut d = descriptor(1);
        d.add_chunk(5, "peer-a");
        assert!(!d.has_chunk(5));
    }

    #[test]
    fn empty_metafile_is_not_downloadable() {
        let d = descriptor(0);
        assert!(!d.has_all_chunks());
    }
}
