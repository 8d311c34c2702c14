//! File-based slot backend
//!
//! Each slot is one JSON file in the storage directory. Writes go to a
//! temporary file that is synced and then renamed over the slot, so a crash
//! mid-write leaves the previous contents intact.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use larder_core::StorageError;
use tracing::{debug, info, trace, warn};

use crate::backend::StorageBackend;

const SLOT_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Persistent implementation of [`StorageBackend`]
///
/// Several processes may open the same directory; they race at the slot
/// level and the last rename wins.
#[derive(Debug)]
pub struct FileBackend {
    /// Path to the storage directory
    dir: PathBuf,
    /// Whether to fsync before renaming (durability vs performance)
    sync_writes: bool,
    /// Disambiguates temp files written concurrently by this process
    temp_counter: AtomicU64,
}

impl FileBackend {
    /// Open (creating if needed) a storage directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_options(dir, true)
    }

    /// Open with explicit sync behaviour
    pub fn with_options(dir: impl AsRef<Path>, sync_writes: bool) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(path = ?dir, sync_writes, "Opened file storage");
        Ok(Self {
            dir,
            sync_writes,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `slot`
    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{SLOT_EXTENSION}", escape_slot(slot)))
    }

    /// Slot stored at `path`, judged by file name alone
    pub fn slot_for_path(&self, path: &Path) -> Option<String> {
        slot_from_file_name(path.file_name()?.to_str()?)
    }

    fn temp_path(&self, slot: &str) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{n}.{TEMP_EXTENSION}",
            escape_slot(slot),
            std::process::id()
        ))
    }
}

impl StorageBackend for FileBackend {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn write_slot(&self, slot: &str, contents: &str) -> Result<(), StorageError> {
        let path = self.slot_path(slot);
        let temp_path = self.temp_path(slot);

        let result = (|| -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(contents.as_bytes())?;
            if self.sync_writes {
                file.sync_all()?;
            }
            fs::rename(&temp_path, &path)
        })();

        if let Err(e) = result {
            warn!(slot, error = %e, "Slot write failed");
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::Io(e.to_string()));
        }

        trace!(slot, bytes = contents.len(), "Wrote slot");
        Ok(())
    }

    fn remove_slot(&self, slot: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => {
                debug!(slot, "Removed slot");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn slots(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(slot) = entry.file_name().to_str().and_then(slot_from_file_name) {
                names.push(slot);
            }
        }
        names.sort();
        Ok(names)
    }

    fn slot_len(&self, slot: &str) -> Result<usize, StorageError> {
        match fs::metadata(self.slot_path(slot)) {
            Ok(meta) => Ok(meta.len() as usize),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

fn slot_from_file_name(name: &str) -> Option<String> {
    if name.starts_with('.') {
        return None;
    }
    let stem = name.strip_suffix(SLOT_EXTENSION)?.strip_suffix('.')?;
    unescape_slot(stem)
}

/// Escape a slot name into a portable file stem.
///
/// ASCII alphanumerics, `_` and `-` pass through; every other byte becomes
/// `~` followed by two lowercase hex digits.
pub fn escape_slot(slot: &str) -> String {
    let mut out = String::with_capacity(slot.len());
    for byte in slot.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push('~');
            out.push_str(&hex::encode([byte]));
        }
    }
    out
}

/// Inverse of [`escape_slot`]. Returns `None` for malformed stems.
pub fn unescape_slot(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut chars = stem.bytes();
    while let Some(byte) = chars.next() {
        if byte == b'~' {
            let hi = chars.next()?;
            let lo = chars.next()?;
            let decoded = hex::decode([hi, lo]).ok()?;
            bytes.extend(decoded);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_escape_round_trip() {
        for slot in ["pf_orders", "pf_my orders", "pf_../etc", "pf_ordenes-ñ", "pf_a~b"] {
            let escaped = escape_slot(slot);
            assert!(escaped
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'~'));
            assert_eq!(unescape_slot(&escaped).as_deref(), Some(slot));
        }
    }

    #[test]
    fn test_malformed_escape_rejected() {
        assert_eq!(unescape_slot("pf~zz"), None);
        assert_eq!(unescape_slot("pf~4"), None);
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();

        assert_eq!(backend.read_slot("pf_orders").unwrap(), None);
        backend.write_slot("pf_orders", "[]").unwrap();
        assert_eq!(backend.read_slot("pf_orders").unwrap().as_deref(), Some("[]"));
        assert_eq!(backend.slot_len("pf_orders").unwrap(), 2);
        assert!(temp.path().join("pf_orders.json").exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        for i in 0..5 {
            backend.write_slot("pf_orders", &format!("[{i}]")).unwrap();
        }
        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["pf_orders.json".to_string()]);
    }

    #[test]
    fn test_slots_lists_only_slot_files() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        backend.write_slot("pf_orders", "[]").unwrap();
        backend.write_slot("pf_my orders", "[]").unwrap();
        fs::write(temp.path().join("notes.txt"), "x").unwrap();
        fs::write(temp.path().join(".pf_orders.1.0.tmp"), "x").unwrap();

        assert_eq!(backend.slots().unwrap(), vec!["pf_my orders", "pf_orders"]);
    }

    #[test]
    fn test_slot_for_path() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        let path = backend.slot_path("pf_my orders");
        assert_eq!(backend.slot_for_path(&path).as_deref(), Some("pf_my orders"));
        assert_eq!(backend.slot_for_path(&temp.path().join("other.txt")), None);
    }

    #[test]
    fn test_remove_missing_slot_is_ok() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        backend.remove_slot("pf_orders").unwrap();
        backend.write_slot("pf_orders", "[]").unwrap();
        backend.remove_slot("pf_orders").unwrap();
        assert_eq!(backend.read_slot("pf_orders").unwrap(), None);
    }

    #[test]
    fn test_reopen_sees_previous_writes() {
        let temp = TempDir::new().unwrap();
        {
            let backend = FileBackend::open(temp.path()).unwrap();
            backend.write_slot("pf_users", r#"[{"id":"u1"}]"#).unwrap();
        }
        let backend = FileBackend::open(temp.path()).unwrap();
        assert_eq!(
            backend.read_slot("pf_users").unwrap().as_deref(),
            Some(r#"[{"id":"u1"}]"#)
        );
    }
}
