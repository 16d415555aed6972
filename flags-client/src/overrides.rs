use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

/// A user-set boolean that takes precedence over the server-provided value
/// until reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagOverride {
    pub enabled: bool,
}

/// Per-flag overrides, keyed by flag name. Created empty, grown on toggle,
/// cleared wholesale by reset; entries never expire.
pub type OverrideSet = HashMap<String, FlagOverride>;

/// File name under the flags home directory, the equivalent of the browser
/// storage key `localFlags`. Distinct from any flag-cache state.
const OVERRIDES_FILE: &str = "local_flags.json";

/// Durable storage for the override set.
///
/// `set` must be read-modify-write against the latest persisted value, never
/// a stale in-memory copy, so concurrent writers converge. It returns the
/// converged set so callers can refresh their mirror from it.
pub trait OverrideStore: Send + Sync {
    fn load(&self) -> Result<OverrideSet, Error>;
    fn set(&self, name: &str, enabled: bool) -> Result<OverrideSet, Error>;
    fn reset_all(&self) -> Result<(), Error>;
    fn report_location(&self) -> String;
}

// If `FLAGS_HOME` is set, use that, otherwise use $HOME/.flags-client
pub fn flags_home_dir() -> PathBuf {
    match std::env::var("FLAGS_HOME") {
        Ok(home) => PathBuf::from(home),
        Err(_) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            Path::new(&home).join(".flags-client")
        }
    }
}

/// Stores overrides as one JSON document on disk, so they survive process
/// restarts within the same user profile.
pub struct FileOverrideStore {
    path: PathBuf,
}

impl FileOverrideStore {
    /// Store at the default location under the flags home directory.
    pub fn new() -> FileOverrideStore {
        FileOverrideStore {
            path: flags_home_dir().join(OVERRIDES_FILE),
        }
    }

    /// Store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> FileOverrideStore {
        FileOverrideStore { path: path.into() }
    }

    fn read(&self) -> Result<OverrideSet, Error> {
        if !self.path.exists() {
            return Ok(OverrideSet::new());
        }
        let raw = std::fs::read_to_string(&self.path).context(format!(
            "While trying to read overrides from file {:?}",
            self.path
        ))?;
        let set = serde_json::from_str(&raw).context("While trying to parse stored overrides")?;
        Ok(set)
    }

    fn write(&self, set: &OverrideSet) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("While trying to create directory {:?}", parent))?;
        }
        let raw = serde_json::to_string(set).context("While trying to serialize overrides")?;
        std::fs::write(&self.path, raw).context(format!(
            "While trying to write overrides to file {:?}",
            self.path
        ))?;
        Ok(())
    }
}

impl Default for FileOverrideStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OverrideStore for FileOverrideStore {
    fn load(&self) -> Result<OverrideSet, Error> {
        self.read()
    }

    fn set(&self, name: &str, enabled: bool) -> Result<OverrideSet, Error> {
        let mut set = self.read()?;
        set.insert(name.to_string(), FlagOverride { enabled });
        self.write(&set)?;
        Ok(set)
    }

    fn reset_all(&self) -> Result<(), Error> {
        self.write(&OverrideSet::new())
    }

    fn report_location(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// In-memory store for tests and for embedders that do not want disk
/// persistence.
#[derive(Default)]
pub struct MemoryOverrideStore {
    set: Mutex<OverrideSet>,
}

impl MemoryOverrideStore {
    pub fn new() -> MemoryOverrideStore {
        MemoryOverrideStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, OverrideSet> {
        match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl OverrideStore for MemoryOverrideStore {
    fn load(&self) -> Result<OverrideSet, Error> {
        Ok(self.lock().clone())
    }

    fn set(&self, name: &str, enabled: bool) -> Result<OverrideSet, Error> {
        let mut set = self.lock();
        set.insert(name.to_string(), FlagOverride { enabled });
        Ok(set.clone())
    }

    fn reset_all(&self) -> Result<(), Error> {
        self.lock().clear();
        Ok(())
    }

    fn report_location(&self) -> String {
        "memory".to_string()
    }
}
