//! # File-Watched Provider
//!
//! Serves items produced from watched files. Each watched file has a callback
//! that turns the file content into one or more [`ConfigItem`]s; on change the
//! new items replace the ones previously produced by that file in a single
//! write, so readers observe either the old set or the new set, never a mix.
//!
//! A background task polls the watched files; reconciles already running keep
//! whatever they read and the next reconcile observes the new content.

use super::error::ConfigError;
use super::store::ConfigProvider;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A key/value pair produced by a reload callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
}

impl ConfigItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Turns file content into configuration items
pub type ReloadCallback = Arc<dyn Fn(&str) -> Result<Vec<ConfigItem>, String> + Send + Sync>;

/// Callback storing the whole file under `<component>-template-content`
pub fn template_callback(component: &str) -> ReloadCallback {
    let key = crate::constants::keys::template_content(component);
    Arc::new(move |content: &str| Ok(vec![ConfigItem::new(key.clone(), content)]))
}

/// Handle on one watched file, used by readiness probes
#[derive(Debug, Clone)]
pub struct WatchHandle {
    path: PathBuf,
    loaded: Arc<AtomicBool>,
}

impl WatchHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file has been loaded successfully at least once
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

struct WatchedFile {
    path: PathBuf,
    callback: ReloadCallback,
    last_content: Option<String>,
    produced_keys: Vec<String>,
    loaded: Arc<AtomicBool>,
}

impl fmt::Debug for WatchedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchedFile")
            .field("path", &self.path)
            .field("produced_keys", &self.produced_keys)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct FileWatchProvider {
    name: String,
    items: RwLock<HashMap<String, String>>,
    watches: Mutex<Vec<WatchedFile>>,
}

impl FileWatchProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(HashMap::new()),
            watches: Mutex::new(Vec::new()),
        }
    }

    /// Start watching `path`. The file is loaded immediately.
    ///
    /// A file that cannot be read yet is not an error: the watch is kept and
    /// the handle reports "not loaded" until a later poll succeeds.
    pub fn watch(
        &self,
        path: impl Into<PathBuf>,
        callback: ReloadCallback,
    ) -> Result<WatchHandle, ConfigError> {
        let mut watched = WatchedFile {
            path: path.into(),
            callback,
            last_content: None,
            produced_keys: Vec::new(),
            loaded: Arc::new(AtomicBool::new(false)),
        };
        let handle = WatchHandle {
            path: watched.path.clone(),
            loaded: watched.loaded.clone(),
        };

        match self.reload(&mut watched) {
            Ok(_) => {}
            Err(ConfigError::Io { path, source }) => {
                warn!(path = %path.display(), error = %source, "watched file not readable yet");
            }
            Err(e) => return Err(e),
        }

        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(watched);
        Ok(handle)
    }

    /// Re-read every watched file and apply the ones whose content changed
    ///
    /// Returns the number of files reloaded. Failed reloads keep the
    /// previous items in place.
    pub fn reload_changed(&self) -> usize {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        let mut reloaded = 0;
        for watched in watches.iter_mut() {
            match self.reload(watched) {
                Ok(true) => reloaded += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %watched.path.display(), error = %e, "template reload failed"),
            }
        }
        reloaded
    }

    fn reload(&self, watched: &mut WatchedFile) -> Result<bool, ConfigError> {
        let content = std::fs::read_to_string(&watched.path).map_err(|source| ConfigError::Io {
            path: watched.path.clone(),
            source,
        })?;

        if watched.last_content.as_deref() == Some(content.as_str()) {
            return Ok(false);
        }

        let produced = (watched.callback)(&content).map_err(|message| ConfigError::Callback {
            path: watched.path.clone(),
            message,
        })?;

        {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            for key in &watched.produced_keys {
                items.remove(key);
            }
            for item in &produced {
                items.insert(item.key.clone(), item.value.clone());
            }
        }

        watched.produced_keys = produced.into_iter().map(|item| item.key).collect();
        watched.last_content = Some(content);
        let first_load = !watched.loaded.swap(true, Ordering::AcqRel);
        if first_load {
            info!(path = %watched.path.display(), keys = ?watched.produced_keys, "loaded watched file");
        } else {
            info!(path = %watched.path.display(), keys = ?watched.produced_keys, "reloaded watched file");
        }
        Ok(true)
    }

    /// Poll watched files until `cancel` fires
    ///
    /// Files are read on the blocking pool.
    pub fn spawn_watch(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("template watch stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let provider = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || provider.reload_changed()).await {
                            Ok(0) => {}
                            Ok(reloaded) => debug!(reloaded, "template watch applied changes"),
                            Err(e) => warn!(error = %e, "template reload task failed"),
                        }
                    }
                }
            }
        })
    }
}

impl ConfigProvider for FileWatchProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}
