//! Persisted view state keyed by instance id.
//!
//! The coordinator reads its store once when it is built and writes it once
//! on teardown, so a view that is torn down and rebuilt with the same id
//! resumes where it left off.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::Provider;

/// Everything a coordinator needs to resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState<T> {
    pub browse: Provider<T>,
    pub search: Provider<T>,
    #[serde(default)]
    pub search_term: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read state file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state for '{id}': {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid instance id '{id}'")]
    InvalidId { id: String },
}

pub trait StateStore<T>: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<PersistedState<T>>, StoreError>;

    fn save(&self, id: &str, state: &PersistedState<T>) -> Result<(), StoreError>;
}

/// Process-local store. Share one instance between coordinators to keep state
/// across teardown and rebuild.
pub struct MemoryStateStore<T> {
    states: Mutex<HashMap<String, PersistedState<T>>>,
}

impl<T> MemoryStateStore<T> {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.lock().contains_key(id)
    }
}

impl<T> Default for MemoryStateStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> StateStore<T> for MemoryStateStore<T> {
    fn load(&self, id: &str) -> Result<Option<PersistedState<T>>, StoreError> {
        Ok(self.states.lock().get(id).cloned())
    }

    fn save(&self, id: &str, state: &PersistedState<T>) -> Result<(), StoreError> {
        self.states.lock().insert(id.to_string(), state.clone());
        Ok(())
    }
}

/// One JSON file per instance id inside a directory.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && id != "."
            && id != "..";
        if !valid {
            return Err(StoreError::InvalidId { id: id.to_string() });
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl<T> StateStore<T> for FileStateStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn load(&self, id: &str) -> Result<Option<PersistedState<T>>, StoreError> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| StoreError::Read {
            path: path.clone(),
            source: e,
        })?;
        let state = serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: path.clone(),
            source: e,
        })?;
        Ok(Some(state))
    }

    fn save(&self, id: &str, state: &PersistedState<T>) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::Write {
            path: self.dir.clone(),
            source: e,
        })?;

        let content = serde_json::to_string_pretty(state).map_err(|e| StoreError::Serialize {
            id: id.to_string(),
            source: e,
        })?;
        fs::write(&path, content).map_err(|e| StoreError::Write { path, source: e })
    }
}
