//! Hot-swappable snapshots of the configuration and the dictionary.
//!
//! Readers take an `Arc` of the current value and keep using it for the whole
//! call; watchers build a complete replacement and swap it in under the write
//! lock, so a half-updated value is never observable.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::translate::dictionary::Dictionary;

/// Atomically replaceable shared value.
pub struct Snapshot<T> {
    inner: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(value))),
        }
    }

    pub fn load(&self) -> Arc<T> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, value: T) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(value);
    }
}

/// Configuration together with the backends built from it.
#[derive(Debug)]
pub struct Runtime {
    pub config: Config,
    pub backends: BackendRegistry,
}

impl Runtime {
    pub fn from_config(config: Config) -> Result<Self> {
        let backends = BackendRegistry::from_config(&config)?;
        Ok(Self { config, backends })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(Config::from_file(path)?)
    }
}

/// Load the dictionary a config points at; an empty path means no dictionary.
pub fn load_dictionary(path: &str) -> Result<Dictionary> {
    if path.trim().is_empty() {
        return Ok(Dictionary::default());
    }
    Dictionary::from_file(path)
}

/// Remembers the last seen modification time of one file.
#[derive(Debug, Clone)]
pub struct PollState {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl PollState {
    /// Start from the file's current mtime.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let modified = modified_time(&path);
        Self { path, modified }
    }

    /// Start without a recorded mtime, so the first poll of an existing file reports a change.
    pub fn unprimed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the mtime differs from the one recorded; records the new one.
    pub fn changed(&mut self) -> bool {
        let current = modified_time(&self.path);
        if current == self.modified {
            return false;
        }
        self.modified = current;
        true
    }

    fn modified_label(&self) -> String {
        match self.modified {
            Some(time) => DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "missing".to_string(),
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Reloads the runtime whenever the config file changes.
#[derive(Debug)]
pub struct ConfigWatch {
    state: PollState,
}

impl ConfigWatch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            state: PollState::new(path),
        }
    }

    /// Returns true if a new runtime was swapped in.
    pub fn poll(&mut self, target: &Snapshot<Runtime>) -> bool {
        if !self.state.changed() {
            return false;
        }

        match Runtime::load(self.state.path()) {
            Ok(runtime) => {
                info!(
                    "Reloaded configuration from {} (modified {})",
                    self.state.path().display(),
                    self.state.modified_label()
                );
                target.replace(runtime);
                true
            }
            Err(e) => {
                warn!("Keeping previous configuration, reload failed: {}", e);
                false
            }
        }
    }
}

/// Follows `dictionary_path` of the current config and reloads on path or mtime changes.
#[derive(Debug, Default)]
pub struct DictionaryWatch {
    state: Option<PollState>,
}

impl DictionaryWatch {
    /// Watch a dictionary that has already been loaded from `path`.
    pub fn new(path: &str) -> Self {
        let state = (!path.trim().is_empty()).then(|| PollState::new(path));
        Self { state }
    }

    /// Returns true if a new dictionary was swapped in.
    pub fn poll(&mut self, path: &str, target: &Snapshot<Dictionary>) -> bool {
        if path.trim().is_empty() {
            if self.state.take().is_some() {
                info!("Dictionary disabled");
                target.replace(Dictionary::default());
                return true;
            }
            return false;
        }

        let state = match &mut self.state {
            Some(state) if state.path() == Path::new(path) => state,
            slot => slot.insert(PollState::unprimed(path)),
        };
        if !state.changed() {
            return false;
        }

        match Dictionary::from_file(state.path()) {
            Ok(dictionary) => {
                info!(
                    "Reloaded {} dictionary entries from {} (modified {})",
                    dictionary.len(),
                    path,
                    state.modified_label()
                );
                target.replace(dictionary);
                true
            }
            Err(e) => {
                warn!("Keeping previous dictionary: {}", e);
                false
            }
        }
    }
}

pub fn spawn_config_watcher(path: PathBuf, runtime: Snapshot<Runtime>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut watch = ConfigWatch::new(path);
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            watch.poll(&runtime);
        }
    })
}

pub fn spawn_dictionary_watcher(
    runtime: Snapshot<Runtime>,
    dictionary: Snapshot<Dictionary>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut watch = DictionaryWatch::new(&runtime.load().config.dictionary_path);
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let path = runtime.load().config.dictionary_path.clone();
            watch.poll(&path, &dictionary);
        }
    })
}
