//! Module lifecycle states and observer hooks.

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Lifecycle state of the module slot owned by the lifecycle manager.
///
/// Exactly one module is ever active; `Loading` and `Unloading` are
/// transitional states that only exist while the manager's lock is held, so
/// external observers normally see `Empty` or `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// No module loaded.
    Empty,
    /// A module is being loaded.
    Loading,
    /// A module is loaded and serving calls.
    Active,
    /// The previous module is being torn down.
    Unloading,
}

impl ModuleState {
    /// Check if a load may start from this state.
    pub fn can_load(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Check if there is a module to unload.
    pub fn can_unload(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if a module is serving calls.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Empty => "no module loaded",
            Self::Loading => "module is being loaded",
            Self::Active => "module loaded and serving calls",
            Self::Unloading => "previous module is being torn down",
        }
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Unloading => "unloading",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle event emitted by the lifecycle manager.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A module was loaded and became active.
    Loaded {
        /// Module artifact path.
        path: PathBuf,
        /// Event time.
        at: Instant,
    },
    /// The active module was fully unloaded.
    Unloaded {
        /// Module artifact path.
        path: PathBuf,
        /// Event time.
        at: Instant,
    },
    /// A reload completed successfully.
    Reloaded {
        /// New module artifact path.
        path: PathBuf,
        /// Total successful reloads so far.
        count: u64,
        /// Event time.
        at: Instant,
    },
    /// A reload failed; see the logs for the step that failed.
    ReloadFailed {
        /// Requested module artifact path.
        path: PathBuf,
        /// Failure description.
        message: String,
        /// Event time.
        at: Instant,
    },
    /// The unload wait bound was exhausted; the module may have leaked.
    UnloadLeaked {
        /// Module artifact path.
        path: PathBuf,
        /// Event time.
        at: Instant,
    },
}

impl HostEvent {
    /// Get the module path the event refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Loaded { path, .. } => path,
            Self::Unloaded { path, .. } => path,
            Self::Reloaded { path, .. } => path,
            Self::ReloadFailed { path, .. } => path,
            Self::UnloadLeaked { path, .. } => path,
        }
    }

    /// Get the event timestamp.
    pub fn timestamp(&self) -> Instant {
        match self {
            Self::Loaded { at, .. } => *at,
            Self::Unloaded { at, .. } => *at,
            Self::Reloaded { at, .. } => *at,
            Self::ReloadFailed { at, .. } => *at,
            Self::UnloadLeaked { at, .. } => *at,
        }
    }

    /// Get the event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::Unloaded { .. } => "unloaded",
            Self::Reloaded { .. } => "reloaded",
            Self::ReloadFailed { .. } => "reload_failed",
            Self::UnloadLeaked { .. } => "unload_leaked",
        }
    }
}

/// Hooks for lifecycle events.
pub struct LifecycleHooks {
    handlers: Vec<Box<dyn Fn(&HostEvent) + Send + Sync>>,
}

impl LifecycleHooks {
    /// Create new lifecycle hooks.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a lifecycle event handler.
    pub fn on_event<F>(&mut self, handler: F)
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Emit a lifecycle event.
    pub fn emit(&self, event: HostEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    /// Emit a loaded event.
    pub fn emit_loaded(&self, path: &Path) {
        self.emit(HostEvent::Loaded {
            path: path.to_path_buf(),
            at: Instant::now(),
        });
    }

    /// Emit an unloaded event.
    pub fn emit_unloaded(&self, path: &Path) {
        self.emit(HostEvent::Unloaded {
            path: path.to_path_buf(),
            at: Instant::now(),
        });
    }

    /// Emit a reloaded event.
    pub fn emit_reloaded(&self, path: &Path, count: u64) {
        self.emit(HostEvent::Reloaded {
            path: path.to_path_buf(),
            count,
            at: Instant::now(),
        });
    }

    /// Emit a reload failed event.
    pub fn emit_reload_failed(&self, path: &Path, message: &str) {
        self.emit(HostEvent::ReloadFailed {
            path: path.to_path_buf(),
            message: message.to_string(),
            at: Instant::now(),
        });
    }

    /// Emit an unload leaked event.
    pub fn emit_unload_leaked(&self, path: &Path) {
        self.emit(HostEvent::UnloadLeaked {
            path: path.to_path_buf(),
            at: Instant::now(),
        });
    }
}

impl Default for LifecycleHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("handler_count", &self.handlers.len())
            .finish()
    }
}
