//! File system watcher for module artifacts.
//!
//! Covers standalone setups where the host does not push file-change
//! notifications itself: the watcher observes the module artifact on disk,
//! debounces the change storm a build produces, and hands the path to a
//! handler — typically a closure driving [`crate::ScriptHost::reload`] and
//! reinstalling the payload. Handlers run on the watcher's own thread,
//! which is exactly where reload work belongs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Configuration for the module watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Debounce duration for file changes.
    pub debounce: Duration,
    /// Whether to watch directories recursively.
    pub recursive: bool,
    /// File extensions to react to.
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            recursive: false,
            extensions: vec!["so".to_string(), "dll".to_string(), "dylib".to_string()],
        }
    }
}

impl WatchConfig {
    /// Create a new watch configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce duration.
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Set recursive watching.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set file extensions to react to.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Event emitted when a watched artifact changes.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// An artifact was created.
    Created {
        /// Path to the created artifact.
        path: PathBuf,
    },
    /// An artifact was modified.
    Modified {
        /// Path to the modified artifact.
        path: PathBuf,
    },
    /// An artifact was removed.
    Removed {
        /// Path to the removed artifact.
        path: PathBuf,
    },
}

impl WatchEvent {
    /// Get the path for this event.
    pub fn path(&self) -> &Path {
        match self {
            Self::Created { path } => path,
            Self::Modified { path } => path,
            Self::Removed { path } => path,
        }
    }

    /// Check if this event affects a file with one of the given extensions.
    pub fn matches_extension(&self, extensions: &[String]) -> bool {
        let path = self.path();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            extensions.iter().any(|e| e == ext)
        } else {
            false
        }
    }
}

type EventHandler = Box<dyn Fn(WatchEvent) + Send + Sync>;

struct WatchState {
    last_events: HashMap<PathBuf, Instant>,
    handlers: Vec<EventHandler>,
}

/// Module artifact watcher.
pub struct ModuleWatcher {
    config: WatchConfig,
    watcher: Option<RecommendedWatcher>,
    watched_paths: RwLock<Vec<PathBuf>>,
    state: Arc<RwLock<WatchState>>,
    running: Arc<AtomicBool>,
}

impl ModuleWatcher {
    /// Create a new module watcher.
    pub fn new(config: WatchConfig) -> Result<Self> {
        let state = Arc::new(RwLock::new(WatchState {
            last_events: HashMap::new(),
            handlers: Vec::new(),
        }));

        Ok(Self {
            config,
            watcher: None,
            watched_paths: RwLock::new(Vec::new()),
            state,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create with default configuration.
    pub fn default_config() -> Result<Self> {
        Self::new(WatchConfig::default())
    }

    /// Get the watcher configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Check if the watcher is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Add a change handler. Handlers run on the watcher's thread.
    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(WatchEvent) + Send + Sync + 'static,
    {
        self.state.write().handlers.push(Box::new(handler));
    }

    /// Start watching.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let running = Arc::clone(&self.running);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                if let Ok(event) = res {
                    Self::handle_event(&state, &config, event);
                }
            },
            Config::default(),
        )
        .map_err(|e| Error::Watch(e.to_string()))?;

        self.watcher = Some(watcher);
        self.running.store(true, Ordering::Relaxed);

        // Register paths added before start.
        let paths = self.watched_paths.read().clone();
        for path in paths {
            self.watch_registered(&path)?;
        }

        tracing::info!("module watcher started");
        Ok(())
    }

    /// Stop watching.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.watcher = None;
        tracing::info!("module watcher stopped");
    }

    /// Watch a path.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        {
            let mut paths = self.watched_paths.write();
            if !paths.contains(&path) {
                paths.push(path.clone());
            }
        }

        if self.running.load(Ordering::Relaxed) {
            self.watch_registered(&path)?;
        }

        Ok(())
    }

    /// Stop watching a path.
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        {
            let mut paths = self.watched_paths.write();
            paths.retain(|p| p != path);
        }

        if let Some(ref mut watcher) = self.watcher {
            watcher
                .unwatch(path)
                .map_err(|e| Error::Watch(e.to_string()))?;
        }

        Ok(())
    }

    /// Get the watched paths.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.read().clone()
    }

    fn watch_registered(&mut self, path: &Path) -> Result<()> {
        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        if let Some(ref mut watcher) = self.watcher {
            watcher
                .watch(path, mode)
                .map_err(|e| Error::Watch(e.to_string()))?;
            tracing::debug!(path = %path.display(), "watching path");
        }
        Ok(())
    }

    fn handle_event(state: &Arc<RwLock<WatchState>>, config: &WatchConfig, event: Event) {
        let watch_event = match event.kind {
            EventKind::Create(_) => event
                .paths
                .first()
                .map(|p| WatchEvent::Created { path: p.clone() }),
            EventKind::Modify(_) => event
                .paths
                .first()
                .map(|p| WatchEvent::Modified { path: p.clone() }),
            EventKind::Remove(_) => event
                .paths
                .first()
                .map(|p| WatchEvent::Removed { path: p.clone() }),
            _ => None,
        };

        let Some(watch_event) = watch_event else {
            return;
        };
        if !watch_event.matches_extension(&config.extensions) {
            return;
        }

        let path = watch_event.path().to_path_buf();
        let mut state = state.write();
        let now = Instant::now();

        if let Some(last) = state.last_events.get(&path) {
            if now.duration_since(*last) < config.debounce {
                return;
            }
        }
        state.last_events.insert(path, now);

        for handler in &state.handlers {
            handler(watch_event.clone());
        }
    }
}

impl std::fmt::Debug for ModuleWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleWatcher")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("watched_paths", &self.watched_paths.read().len())
            .finish()
    }
}

impl Drop for ModuleWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
