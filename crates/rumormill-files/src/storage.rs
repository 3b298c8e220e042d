//! Download-directory persistence.
//!
//! Completed files (uploaded or reconstructed) live under
//! `_Downloads/<node_name>/<file_name>`. The directory is rescanned at
//! startup so previously shared files survive restarts.

use std::path::PathBuf;

use rumormill_types::{Result, RumormillError};

/// Root directory for completed files, relative to the working
/// directory.
pub const DOWNLOAD_DIR: &str = "_Downloads";

fn node_dir(node_name: &str) -> PathBuf {
    PathBuf::from(DOWNLOAD_DIR).join(node_name)
}

/// Writes `content` to `_Downloads/<node_name>/<file_name>`, creating
/// directories as needed.
///
/// File names are reduced to their final path component first, so a
/// peer-supplied name cannot escape the download directory.
///
/// # Errors
///
/// Returns [`RumormillError::StorageError`] on I/O failure; reported
/// to the caller of the triggering operation, never fatal.
pub fn save_file(node_name: &str, file_name: &str, content: &[u8]) -> Result<()> {
    let file_name = sanitize(file_name)?;
    let dir = node_dir(node_name);
    std::fs::create_dir_all(&dir).map_err(|e| RumormillError::StorageError {
        reason: format!("cannot create download directory: {e}"),
    })?;
    std::fs::write(dir.join(file_name), content).map_err(|e| RumormillError::StorageError {
        reason: format!("cannot write file: {e}"),
    })
}

/// Reads a previously saved file.
pub fn load_file(node_name: &str, file_name: &str) -> Result<Vec<u8>> {
    let file_name = sanitize(file_name)?;
    std::fs::read(node_dir(node_name).join(file_name)).map_err(|e| {
        RumormillError::StorageError {
            reason: format!("cannot read file: {e}"),
        }
    })
}

/// Lists the files saved for this node, creating the directory on
/// first use.
pub fn list_files(node_name: &str) -> Result<Vec<String>> {
    let dir = node_dir(node_name);
    std::fs::create_dir_all(&dir).map_err(|e| RumormillError::StorageError {
        reason: format!("cannot create download directory: {e}"),
    })?;
    let mut names = Vec::new();
    let entries = std::fs::read_dir(&dir).map_err(|e| RumormillError::StorageError {
        reason: format!("cannot list download directory: {e}"),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| RumormillError::StorageError {
            reason: format!("cannot read directory entry: {e}"),
        })?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Strips any path components from a file name.
fn sanitize(file_name: &str) -> Result<&str> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    if base.is_empty() || base == "." || base == ".." {
        return Err(RumormillError::StorageError {
            reason: format!("invalid file name '{file_name}'"),
        });
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The download directory is relative to the working directory, so
    // these tests chdir into a tempdir. Serialised by a lock to keep
    // the working directory stable across parallel test threads.
    use std::sync::Mutex;
    static CWD_LOCK: Mutex<()> = Mutex::new(());

    fn in_tempdir<F: FnOnce()>(f: F) {
        let _guard = CWD_LOCK.lock().expect("cwd lock");
        let dir = tempfile::tempdir().expect("tempdir");
        let prev = std::env::current_dir().expect("cwd");
        std::env::set_current_dir(dir.path()).expect("chdir");
        f();
        std::env::set_current_dir(prev).expect("chdir back");
    }

    #[test]
    fn save_and_load_roundtrip() {
        in_tempdir(|| {
            save_file("nodea", "doc.txt", b"hello").expect("save");
            let loaded = load_file("nodea", "doc.txt").expect("load");
            assert_eq!(loaded, b"hello");
        });
    }

    #[test]
    fn list_reports_saved_files() {
        in_tempdir(|| {
            save_file("nodea", "b.txt", b"2").expect("save");
            save_file("nodea", "a.txt", b"1").expect("save");
            assert_eq!(list_files("nodea").expect("list"), vec!["a.txt", "b.txt"]);
        });
    }

    #[test]
    fn path_components_are_stripped() {
        in_tempdir(|| {
            save_file("nodea", "../../evil.txt", b"x").expect("save");
            assert_eq!(list_files("nodea").expect("list"), vec!["evil.txt"]);
        });
    }

    #[test]
    fn empty_name_rejected() {
        in_tempdir(|| {
            assert!(save_file("nodea", "", b"x").is_err());
            assert!(save_file("nodea", "..", b"x").is_err());
        });
    }
}
