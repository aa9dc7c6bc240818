//! On-disk credential store.
//!
//! Persists the session credential bundle as a directory of JSON
//! files. The identity credential (`creds.json`) doubles as the
//! existence marker for the whole session.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::auth::{AuthState, CREDS_FILE, SessionFileSet};

/// Errors from credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A present file could not be parsed. Never silently ignored:
    /// this can indicate disk corruption or a bad bundle from the
    /// session manager.
    #[error("corrupt session state in {file}: {source}")]
    Corrupt {
        file: String,
        source: serde_json::Error,
    },

    /// The session directory exists but the identity credential is
    /// missing — a partially-written bundle.
    #[error("incomplete session state: {CREDS_FILE} missing")]
    Incomplete,

    /// A fetched file name would resolve outside the session
    /// directory. Never written.
    #[error("unsafe session file name: {file}")]
    UnsafeName { file: String },
}

/// Filesystem-backed credential store for one session.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at the given session directory.
    /// The directory is not created until the first `save`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the session directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Returns `true` iff the identity credential file is present.
    pub fn exists(&self) -> bool {
        self.dir.join(CREDS_FILE).is_file()
    }

    /// Reconstructs an [`AuthState`] from the directory contents.
    ///
    /// Every present JSON file must parse; any unparseable file fails
    /// the whole load with [`StoreError::Corrupt`].
    pub fn load(&self) -> Result<AuthState, StoreError> {
        let mut creds: Option<serde_json::Value> = None;
        let mut keys: HashMap<String, serde_json::Value> = HashMap::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let raw = std::fs::read_to_string(entry.path())?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                    file: name.clone(),
                    source,
                })?;

            if name == CREDS_FILE {
                creds = Some(value);
            } else {
                keys.insert(name, value);
            }
        }

        let creds = creds.ok_or(StoreError::Incomplete)?;
        debug!(dir = ?self.dir, keys = keys.len(), "loaded session state");
        Ok(AuthState { creds, keys })
    }

    /// Writes a fetched file set into the session directory.
    ///
    /// Creates the directory (and parents) if needed and writes each
    /// entry verbatim. A failure on one file does not stop the rest;
    /// every failure is logged and the first is returned as a soft
    /// error. The next `load` is the backstop for broken writes.
    pub fn save(&self, files: &SessionFileSet) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;

        let mut first_err: Option<StoreError> = None;
        for (name, content) in files {
            // File names come from the session manager; anything that
            // is not a plain file name stays out of the directory.
            if !is_plain_file_name(name) {
                warn!(file = %name, "refusing to write session file with unsafe name");
                first_err.get_or_insert(StoreError::UnsafeName { file: name.clone() });
                continue;
            }
            if let Err(e) = std::fs::write(self.dir.join(name), content) {
                warn!(file = %name, error = %e, "failed to write session file");
                first_err.get_or_insert(StoreError::Io(e));
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                debug!(dir = ?self.dir, files = files.len(), "persisted session files");
                Ok(())
            }
        }
    }

    /// Recursively removes the session directory.
    ///
    /// Idempotent: an already-absent directory is success.
    pub fn wipe(&self) -> Result<(), StoreError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = ?self.dir, "wiped session state");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// A single normal path component: no separators, no `..`, no root.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = std::path::Path::new(name).components();
    matches!(components.next(), Some(std::path::Component::Normal(_))) && components.next().is_none()
}
