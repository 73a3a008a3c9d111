//! Durable record of fully processed archives.
//!
//! One key per line in a plain text file next to the outputs. A key is
//! appended and synced to disk before it becomes visible to `is_complete`,
//! so a crash can lose at most the mark being written, never corrupt an
//! earlier one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use rustc_hash::FxHashSet;

/// Ledger file name inside each month directory
pub const LEDGER_FILE: &str = "completed";

#[derive(Debug)]
pub struct CompletionLedger {
    path: PathBuf,
    keys: RwLock<FxHashSet<String>>,
    /// Serializes appends; held across the write and the set insert
    file: Mutex<File>,
}

impl CompletionLedger {
    /// Load `path`, creating it if absent
    pub fn open(path: &Path) -> io::Result<Self> {
        let existing = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let keys: FxHashSet<String> = existing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        // A crash mid-append leaves a partial line; terminate it so the next key
        // starts on its own line.
        if !existing.is_empty() && !existing.ends_with('\n') {
            file.write_all(b"\n")?;
            file.sync_data()?;
        }

        log::debug!("Ledger {}: {} completed archives", path.display(), keys.len());
        Ok(Self {
            path: path.to_path_buf(),
            keys: RwLock::new(keys),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_complete(&self, key: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Durably record `key`. Returns `false` if it was already present.
    pub fn mark_complete(&self, key: &str) -> io::Result<bool> {
        if key.is_empty() || key.contains(['\n', '\r']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid ledger key {key:?}"),
            ));
        }

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_complete(key) {
            return Ok(false);
        }
        file.write_all(format!("{key}\n").as_bytes())?;
        file.flush()?;
        file.sync_data()?;
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        keys.sort_unstable();
        keys
    }
}
