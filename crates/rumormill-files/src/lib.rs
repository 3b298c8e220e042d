//! Content-addressed file engine: chunking, metafiles, descriptors
//! and download-directory persistence.
//!
//! Files are split into 8 KiB chunks (the last may be shorter). The
//! metafile is the byte concatenation of the SHA-256 hash of each
//! chunk; the metahash — SHA-256 of the metafile — identifies the
//! file externally together with its name.

pub mod descriptor;
pub mod storage;

use rumormill_crypto::hash::{sha256, HASH_LEN};

pub use descriptor::{FileDescriptor, SharedFile};
pub use storage::{list_files, load_file, save_file, DOWNLOAD_DIR};

/// Chunk size in bytes.
pub const CHUNK_SIZE: usize = 8192;

/// Splits `content` into chunk hashes and builds the shared-file
/// metadata.
pub fn build_metadata(name: &str, content: &[u8]) -> SharedFile {
    let num_chunks = content.len().div_ceil(CHUNK_SIZE);
    let mut metafile = Vec::with_capacity(num_chunks * HASH_LEN);
    for chunk in content.chunks(CHUNK_SIZE) {
        metafile.extend_from_slice(&sha256(chunk));
    }
    let metahash = sha256(&metafile).to_vec();
    tracing::info!(
        file = name,
        hash = %hex::encode(&metahash),
        chunks = num_chunks,
        "built file metadata"
    );
    SharedFile {
        name: name.to_string(),
        size: content.len(),
        metafile,
        metahash,
    }
}

/// Checks a received metafile against its metahash.
///
/// Empty bytes are valid: they signal "the sender does not have this
/// file". Otherwise the length must be a multiple of 32 and the hash
/// must match.
pub fn verify_metafile(metahash: &[u8], metafile: &[u8]) -> bool {
    if metafile.is_empty() {
        return true;
    }
    if metafile.len() % HASH_LEN != 0 {
        return false;
    }
    sha256(metafile) == metahash
}

/// Checks a received chunk against entry `index` of the metafile.
pub fn verify_chunk(index: usize, metafile: &[u8], data: &[u8]) -> bool {
    let start = index * HASH_LEN;
    let end = start + HASH_LEN;
    if end > metafile.len() {
        return false;
    }
    sha256(data) == metafile[start..end]
}

/// Returns the hash of chunk `index` from a metafile, if in range.
pub fn chunk_hash(metafile: &[u8], index: usize) -> Option<&[u8]> {
    let start = index * HASH_LEN;
    let end = start + HASH_LEN;
    metafile.get(start..end)
}

/// Number of chunks described by a metafile.
pub fn chunk_count(metafile: &[u8]) -> usize {
    metafile.len() / HASH_LEN
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_for_three_chunk_file() {
        // 20 000 bytes -> 3 chunks (8192 + 8192 + 3616).
        let content = vec![0x5Au8; 20_000];
        let file = build_metadata("doc.bin", &content);
        assert_eq!(file.size, 20_000);
        assert_eq!(chunk_count(&file.metafile), 3);
        assert_eq!(file.metahash, sha256(&file.metafile));
    }

    #[test]
    fn metafile_verifies_against_its_metahash() {
        let file = build_metadata("doc.bin", &[1, 2, 3]);
        assert!(verify_metafile(&file.metahash, &file.metafile));
    }

    #[test]
    fn empty_metafile_means_not_held() {
        assert!(verify_metafile(&[0xAB; 32], &[]));
    }

    #[test]
    fn metafile_with_ragged_length_rejected() {
        assert!(!verify_metafile(&[0xAB; 32], &[0u8; 33]));
    }

    #[test]
    fn metafile_with_wrong_hash_rejected() {
        let file = build_metadata("doc.bin", &[1, 2, 3]);
        assert!(!verify_metafile(&[0u8; 32], &file.metafile));
    }

    #[test]
    fn every_chunk_verifies() {
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let file = build_metadata("doc.bin", &content);
        for (i, chunk) in content.chunks(CHUNK_SIZE).enumerate() {
            assert!(verify_chunk(i, &file.metafile, chunk));
        }
    }

    #[test]
    fn corrupted_chunk_rejected() {
        let content = vec![0x11u8; CHUNK_SIZE * 2];
        let file = build_metadata("doc.bin", &content);
        let mut chunk = content[..CHUNK_SIZE].to_vec();
        chunk[0] ^= 0xFF;
        assert!(!verify_chunk(0, &file.metafile, &chunk));
    }

    #[test]
    fn chunk_index_out_of_range_rejected() {
        let file = build_metadata("doc.bin", &[0u8; 10]);
        assert!(!verify_chunk(5, &file.metafile, &[0u8; 10]));
        assert!(chunk_hash(&file.metafile, 5).is_none());
    }

    #[test]
    fn reassembly_roundtrip() {
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 7) as u8).collect();
        let file = build_metadata("doc.bin", &content);
        let reassembled: Vec<u8> = content
            .chunks(CHUNK_SIZE)
            .flat_map(|c| c.to_vec())
            .collect();
        assert_eq!(reassembled, content);
        assert!(verify_metafile(&file.metahash, &file.metafile));
    }
}
