//! # script-host-runtime
//!
//! Hot-reloadable script module host with a stable C ABI dispatch surface
//! for native engines.
//!
//! A native host process loads this crate (built as a `cdylib`), calls
//! [`script_host_startup`] once, and receives an opaque handle to the root
//! [`Application`] plus one dispatch table per capability: lifecycle,
//! input, per-frame tick, and file-change notification. Script logic lives
//! in a separately compiled module artifact that can be replaced on disk
//! and reloaded without restarting the host.
//!
//! This crate provides:
//! - **Opaque Handles** - Stable address-sized tokens the host stores and
//!   passes back; stale tokens fail loudly instead of returning garbage
//! - **Dispatch Tables** - Fixed `#[repr(C)]` function-pointer tables,
//!   published once at startup, safe to call from multiple host threads
//! - **Module Loading** - Isolated, unloadable load contexts over dynamic
//!   libraries with module-relative dependency resolution
//! - **Hot Reload** - Serialized unload/load with a bounded quiescence wait,
//!   so in-flight frames finish before module memory is released
//! - **Payload Indirection** - Weak-reference forwarding that turns calls
//!   on an unloaded module into silent no-ops instead of crashes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use script_host_runtime::{HostConfig, ScriptHost, Application, ScriptPayload};
//!
//! // Load the first module version.
//! let host = ScriptHost::new(HostConfig::default());
//! let payload = host.reload("./modules/libgame_script.so")?;
//!
//! // Install it on the root application and drive it.
//! let application = Application::new();
//! application.install(payload);
//! application.initialize();
//! application.tick(engine_handle);
//! ```
//!
//! Module crates implement [`ScriptModule`] and export it with
//! [`export_script_modules!`].
//!
//! ## Feature Flags
//!
//! - `watch`: Filesystem watching for self-hosted hot reload
//! - `metrics-prometheus`: Prometheus metrics integration

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod abi;
mod application;
mod context;
mod entry;
mod error;
mod handle;
mod host;
mod lifecycle;
mod loader;
mod module;
mod payload;

#[cfg(feature = "watch")]
mod watcher;

#[cfg(feature = "metrics-prometheus")]
mod metrics;

pub use abi::{
    CursorPosition, EngineHandle, EntryInfo, FileWatchFunctions, InputFunctions, KeyboardInput,
    LifecycleFunctions, TickFunctions, ABI_VERSION, KEY_STATE_PRESSED, KEY_STATE_RELEASED,
};
pub use application::Application;
pub use context::{native_library_filename, DependencyResolution, LoadContext};
pub use entry::script_host_startup;
pub use error::{Error, Result};
pub use handle::{HandleRegistry, RawHandle};
pub use host::{HostConfig, HostStats, ScriptHost, UnloadOutcome};
pub use lifecycle::{HostEvent, LifecycleHooks, ModuleState};
pub use loader::{LoadedModule, LoaderConfig, ModuleLoader};
pub use module::{
    vtable_of, ModuleInfo, ScriptExports, ScriptExportsFn, ScriptInstance, ScriptModule,
    ScriptVTable, SCRIPT_EXPORTS_SYMBOL,
};
pub use payload::ScriptPayload;

#[cfg(feature = "watch")]
pub use watcher::{ModuleWatcher, WatchConfig, WatchEvent};

#[cfg(feature = "metrics-prometheus")]
pub use metrics::{HostMetrics, MetricsConfig};

/// Crate version for compatibility checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
