use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs::write_atomic;

/// State the updater keeps between launches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterState {
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Artifacts fetched by earlier runs, removed on the next launch.
    #[serde(default)]
    pub previous_downloads: BTreeSet<PathBuf>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode updater state: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StateError {
    fn io_with_path(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistence for [`UpdaterState`].
///
/// `update` is a single read-modify-write: no other `update` on the same
/// store, in this process or another, interleaves with it.
pub trait StateStore: Send + Sync {
    /// # Errors
    /// Returns an error when the backing storage cannot be read.
    fn load(&self) -> Result<UpdaterState, StateError>;

    /// Apply `change` to the current state and persist the result.
    ///
    /// # Errors
    /// Returns an error when the state cannot be read or written back; the
    /// stored state is then unchanged.
    fn update(
        &self,
        change: &mut dyn FnMut(&mut UpdaterState),
    ) -> Result<UpdaterState, StateError>;
}

/// JSON file store guarded by an in-process mutex and an advisory file lock.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self {
            path,
            lock_path,
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_lock_file(&self) -> Result<File, StateError> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                StateError::io_with_path("failed to create state directory", parent, error)
            })?;
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|error| {
                StateError::io_with_path("failed to open state lock", &self.lock_path, error)
            })
    }

    fn apply_locked(
        &self,
        change: &mut dyn FnMut(&mut UpdaterState),
    ) -> Result<UpdaterState, StateError> {
        let mut state = self.read()?;
        change(&mut state);
        let content = serde_json::to_vec_pretty(&state).map_err(StateError::Encode)?;
        write_atomic(&self.path, &content).map_err(|error| {
            StateError::io_with_path("failed to write updater state", &self.path, error)
        })?;
        Ok(state)
    }

    fn read(&self) -> Result<UpdaterState, StateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content).unwrap_or_else(|error| {
                warn!(
                    "Ignoring unreadable updater state {}: {error}",
                    self.path.display()
                );
                UpdaterState::default()
            })),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(UpdaterState::default())
            }
            Err(error) => Err(StateError::io_with_path(
                "failed to read updater state",
                &self.path,
                error,
            )),
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<UpdaterState, StateError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = self.open_lock_file()?;
        lock.lock_shared().map_err(|error| {
            StateError::io_with_path("failed to lock updater state", &self.lock_path, error)
        })?;

        let state = self.read();
        let _ = FileExt::unlock(&lock);
        state
    }

    fn update(
        &self,
        change: &mut dyn FnMut(&mut UpdaterState),
    ) -> Result<UpdaterState, StateError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = self.open_lock_file()?;
        lock.lock_exclusive().map_err(|error| {
            StateError::io_with_path("failed to lock updater state", &self.lock_path, error)
        })?;

        let result = self.apply_locked(change);
        let _ = FileExt::unlock(&lock);
        result
    }
}

/// Volatile store for tests and for hosts that keep no state on disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<UpdaterState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(state: UpdaterState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> UpdaterState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<UpdaterState, StateError> {
        Ok(self.snapshot())
    }

    fn update(
        &self,
        change: &mut dyn FnMut(&mut UpdaterState),
    ) -> Result<UpdaterState, StateError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        change(&mut *state);
        Ok(state.clone())
    }
}
