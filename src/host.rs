//! Process-wide module lifecycle manager.
//!
//! [`ScriptHost`] owns "is a module currently loaded". It serializes every
//! load and unload behind one mutex, so an old module is always fully torn
//! down before its replacement loads, and at no observable point are two
//! modules active. The tick path never takes that mutex — ticks read the
//! application's atomically swapped payload — which is why unloading may
//! block its own thread for the bounded quiescence wait.
//!
//! Reload work belongs on the file-watch or a maintenance thread, never
//! inline on the host's tick path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::context::LoadContext;
use crate::error::{Error, Result};
use crate::lifecycle::{HostEvent, LifecycleHooks, ModuleState};
use crate::loader::{LoaderConfig, ModuleLoader};
use crate::module::{ModuleInfo, ScriptInstance};
use crate::payload::ScriptPayload;

/// Configuration for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Loader configuration.
    pub loader: LoaderConfig,
    /// Maximum number of completion checks during an unload before the
    /// manager declares a leak and proceeds.
    pub max_unload_passes: usize,
    /// Sleep between unload completion checks, giving in-flight calls time
    /// to drop their transient instance references.
    pub unload_retry_delay: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            max_unload_passes: 10,
            unload_retry_delay: Duration::from_millis(10),
        }
    }
}

impl HostConfig {
    /// Create a new host configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loader configuration.
    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Set the unload completion check bound.
    pub fn with_max_unload_passes(mut self, passes: usize) -> Self {
        self.max_unload_passes = passes;
        self
    }

    /// Set the delay between unload completion checks.
    pub fn with_unload_retry_delay(mut self, delay: Duration) -> Self {
        self.unload_retry_delay = delay;
        self
    }
}

/// Outcome of an unload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    /// No module was active; the request was a no-op.
    Idle,
    /// The context was observed dead within the bounded wait.
    Released,
    /// The wait bound was exhausted; a leak was logged and the manager
    /// proceeded anyway.
    Leaked,
}

/// Snapshot of the lifecycle manager's state.
#[derive(Debug, Clone)]
pub struct HostStats {
    /// Current lifecycle state.
    pub state: ModuleState,
    /// Successful reloads so far.
    pub reload_count: u64,
    /// Path of the active module, if any.
    pub active_path: Option<PathBuf>,
    /// Recorded pending module path, if any.
    pub pending_path: Option<PathBuf>,
}

struct ActiveModule {
    info: ModuleInfo,
    context: Arc<LoadContext>,
    instance: Arc<ScriptInstance>,
}

struct HostInner {
    state: ModuleState,
    pending_path: Option<PathBuf>,
    active: Option<ActiveModule>,
    reload_count: u64,
}

static GLOBAL: Lazy<ScriptHost> = Lazy::new(|| ScriptHost::new(HostConfig::default()));

/// The module lifecycle manager.
///
/// The entry point and the dispatch wrappers use the process-wide instance
/// ([`ScriptHost::global`]); independent instances exist for tests and
/// embedding.
pub struct ScriptHost {
    config: HostConfig,
    loader: ModuleLoader,
    inner: Mutex<HostInner>,
    hooks: RwLock<LifecycleHooks>,
    #[cfg(feature = "metrics-prometheus")]
    metrics: RwLock<Option<Arc<crate::metrics::HostMetrics>>>,
}

impl ScriptHost {
    /// Create a new lifecycle manager.
    pub fn new(config: HostConfig) -> Self {
        Self {
            loader: ModuleLoader::new(config.loader.clone()),
            config,
            inner: Mutex::new(HostInner {
                state: ModuleState::Empty,
                pending_path: None,
                active: None,
                reload_count: 0,
            }),
            hooks: RwLock::new(LifecycleHooks::new()),
            #[cfg(feature = "metrics-prometheus")]
            metrics: RwLock::new(None),
        }
    }

    /// The process-wide instance used by the ABI surface.
    pub fn global() -> &'static ScriptHost {
        &GLOBAL
    }

    /// Get the host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        self.inner.lock().state
    }

    /// Information about the active module, if any.
    pub fn active_module(&self) -> Option<ModuleInfo> {
        self.inner.lock().active.as_ref().map(|m| m.info.clone())
    }

    /// Snapshot of the manager's state.
    pub fn stats(&self) -> HostStats {
        let inner = self.inner.lock();
        HostStats {
            state: inner.state,
            reload_count: inner.reload_count,
            active_path: inner.active.as_ref().map(|m| m.info.path.clone()),
            pending_path: inner.pending_path.clone(),
        }
    }

    /// Add a lifecycle event handler.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        self.hooks.write().on_event(handler);
    }

    /// Attach a metrics collector.
    #[cfg(feature = "metrics-prometheus")]
    pub fn set_metrics(&self, metrics: Arc<crate::metrics::HostMetrics>) {
        *self.metrics.write() = Some(metrics);
    }

    /// Record which module should become active next. Does not load.
    pub fn set_pending_path(&self, path: impl Into<PathBuf>) {
        self.inner.lock().pending_path = Some(path.into());
    }

    /// The recorded pending module path, if any.
    pub fn pending_path(&self) -> Option<PathBuf> {
        self.inner.lock().pending_path.clone()
    }

    /// Load the pending module and return a payload over its instance.
    ///
    /// Fails without side effects when no path is set, the artifact is
    /// missing or invalid, or a module is already active.
    pub fn load_pending(&self) -> Result<ScriptPayload> {
        let mut events = Vec::new();
        let result = {
            let mut inner = self.inner.lock();
            self.load_pending_locked(&mut inner, &mut events)
        };
        self.emit_events(events);
        result
    }

    /// Tear down the active module and wait boundedly for quiescence.
    ///
    /// Idempotent: a no-op when nothing is loaded. Blocks the calling
    /// thread for at most `max_unload_passes * unload_retry_delay`; never
    /// call this from the host's tick thread.
    pub fn unload_active(&self) -> UnloadOutcome {
        let mut events = Vec::new();
        let outcome = {
            let mut inner = self.inner.lock();
            self.unload_active_locked(&mut inner, &mut events)
        };
        self.emit_events(events);
        outcome
    }

    /// Replace the active module with the artifact at `path`.
    ///
    /// A missing artifact fails *before* the active module is touched, so a
    /// bad notification leaves the previous module fully in service. A
    /// failure after the old module is torn down leaves the manager empty
    /// and the orphaned payload degrading to silent no-ops. Never exposes
    /// partial success.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<ScriptPayload> {
        let path = path.as_ref().to_path_buf();
        let mut events = Vec::new();
        let result = {
            let mut inner = self.inner.lock();
            inner.pending_path = Some(path.clone());

            let resolved = self.loader.resolve_path(&path);
            let outcome = if !resolved.is_file() {
                Err(Error::module_not_found(resolved))
            } else {
                if inner.state.can_unload() {
                    self.unload_active_locked(&mut inner, &mut events);
                }
                self.load_pending_locked(&mut inner, &mut events)
            };

            match &outcome {
                Ok(_) => {
                    inner.reload_count += 1;
                    events.push(HostEvent::Reloaded {
                        path: path.clone(),
                        count: inner.reload_count,
                        at: Instant::now(),
                    });
                    tracing::info!(
                        path = %path.display(),
                        count = inner.reload_count,
                        "module reloaded"
                    );
                }
                Err(err) => {
                    events.push(HostEvent::ReloadFailed {
                        path: path.clone(),
                        message: err.to_string(),
                        at: Instant::now(),
                    });
                    #[cfg(feature = "metrics-prometheus")]
                    self.record(|m| m.record_reload_failure());
                    tracing::error!(error = %err, path = %path.display(), "reload failed");
                }
            }
            outcome
        };
        self.emit_events(events);
        result
    }

    fn load_pending_locked(
        &self,
        inner: &mut HostInner,
        events: &mut Vec<HostEvent>,
    ) -> Result<ScriptPayload> {
        if !inner.state.can_load() {
            return Err(Error::invalid_state(
                ModuleState::Empty.to_string(),
                inner.state.to_string(),
            ));
        }
        let path = inner.pending_path.clone().ok_or(Error::PathUnset)?;

        inner.state = ModuleState::Loading;
        let started = Instant::now();
        match self.loader.load(&path) {
            Ok(module) => {
                let (info, context, instance) = module.into_parts();
                let payload = ScriptPayload::new(&instance);
                events.push(HostEvent::Loaded {
                    path: info.path.clone(),
                    at: Instant::now(),
                });
                #[cfg(feature = "metrics-prometheus")]
                self.record(|m| m.record_load(started.elapsed().as_secs_f64()));
                #[cfg(not(feature = "metrics-prometheus"))]
                let _ = started;
                inner.active = Some(ActiveModule {
                    info,
                    context,
                    instance,
                });
                inner.state = ModuleState::Active;
                Ok(payload)
            }
            Err(err) => {
                inner.state = ModuleState::Empty;
                tracing::error!(error = %err, path = %path.display(), "module load failed");
                Err(err)
            }
        }
    }

    fn unload_active_locked(
        &self,
        inner: &mut HostInner,
        events: &mut Vec<HostEvent>,
    ) -> UnloadOutcome {
        let Some(active) = inner.active.take() else {
            tracing::debug!("unload requested with no active module");
            return UnloadOutcome::Idle;
        };
        inner.state = ModuleState::Unloading;
        let path = active.info.path.clone();
        tracing::info!(path = %path.display(), "unloading active module");

        active.context.unload();
        let probe = Arc::downgrade(&active.context);
        // Drops the manager's strong references. The instance tears down
        // here unless an in-flight call still holds an upgraded payload
        // reference; the probe stays alive exactly as long as any such
        // reference does.
        drop(active);

        let mut passes = 0;
        let released = loop {
            if probe.upgrade().is_none() {
                break true;
            }
            if passes >= self.config.max_unload_passes {
                break false;
            }
            passes += 1;
            std::thread::sleep(self.config.unload_retry_delay);
        };

        inner.state = ModuleState::Empty;
        if released {
            tracing::debug!(path = %path.display(), passes, "module unloaded");
            events.push(HostEvent::Unloaded {
                path,
                at: Instant::now(),
            });
            #[cfg(feature = "metrics-prometheus")]
            self.record(|m| m.record_unload(passes));
            UnloadOutcome::Released
        } else {
            tracing::warn!(
                path = %path.display(),
                passes,
                "module still referenced after unload wait; proceeding with suspected leak"
            );
            events.push(HostEvent::UnloadLeaked {
                path,
                at: Instant::now(),
            });
            #[cfg(feature = "metrics-prometheus")]
            self.record(|m| m.record_unload_leak());
            UnloadOutcome::Leaked
        }
    }

    // Events are emitted after the state lock is released so handlers may
    // query the host.
    fn emit_events(&self, events: Vec<HostEvent>) {
        if events.is_empty() {
            return;
        }
        let hooks = self.hooks.read();
        for event in events {
            hooks.emit(event);
        }
    }

    #[cfg(feature = "metrics-prometheus")]
    fn record(&self, f: impl FnOnce(&crate::metrics::HostMetrics)) {
        if let Some(metrics) = self.metrics.read().as_deref() {
            f(metrics);
        }
    }
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ScriptHost")
            .field("state", &inner.state)
            .field("reload_count", &inner.reload_count)
            .field("pending_path", &inner.pending_path)
            .finish()
    }
}
