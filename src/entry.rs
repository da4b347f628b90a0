//! Host-facing entry point and process-wide wiring.
//!
//! The host calls [`script_host_startup`] exactly once, passing a pointer to
//! an [`EntryInfo`] structure it owns. The runtime registers the root
//! [`Application`] with the global handle registry and writes the handle and
//! the dispatch tables into that structure. From then on every host call
//! arrives through a table entry; reloads arrive through the file-watch
//! table and are handled on the notifying thread.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::abi::{
    self, EntryInfo, FileWatchFunctions, InputFunctions, LifecycleFunctions, TickFunctions,
};
use crate::application::Application;
use crate::handle::{self, RawHandle};
use crate::host::ScriptHost;

static STARTED: AtomicBool = AtomicBool::new(false);
static RUNTIME: OnceCell<RuntimeGlobals> = OnceCell::new();

struct RuntimeGlobals {
    application: Arc<Application>,
}

/// Startup entry point, called exactly once by the host.
///
/// Fills the host-owned `entry_info` structure with the root application
/// handle and one dispatch table per capability. A null pointer or a second
/// call is logged and ignored.
///
/// # Safety
///
/// `entry_info` must be null or point to writable memory large enough for
/// an [`EntryInfo`], exclusively available to this call.
#[no_mangle]
pub unsafe extern "C" fn script_host_startup(entry_info: *mut EntryInfo) {
    abi::ffi_guard("script_host_startup", || {
        if entry_info.is_null() {
            tracing::error!("startup called with a null entry structure");
            return;
        }
        if STARTED.swap(true, Ordering::SeqCst) {
            tracing::error!("startup called more than once; ignoring");
            return;
        }

        let application = Arc::new(Application::new());
        let handle = handle::global().issue(Arc::clone(&application));
        let _ = RUNTIME.set(RuntimeGlobals { application });

        // SAFETY: checked non-null above; the host hands us exclusive
        // access to this memory for the duration of the call.
        unsafe {
            entry_info.write(EntryInfo {
                application: handle,
                lifecycle: LifecycleFunctions::new(),
                input: InputFunctions::new(),
                tick: TickFunctions::new(),
                file_watch: FileWatchFunctions::new(),
            });
        }

        tracing::info!(application = %handle, "script host runtime ready");
    });
}

/// Shutdown path behind the lifecycle table's `shutdown` entry.
///
/// Unloads the active module, detaches the payload, and releases the root
/// handle so the application becomes collectible — the handle registry is
/// the only thing keeping it alive.
pub(crate) fn shutdown_application(application: RawHandle) {
    let application_object = handle::global().resolve::<Application>(application);
    ScriptHost::global().unload_active();
    application_object.detach();
    handle::global().release(application);
    tracing::info!("script host runtime shut down");
}

/// Reload path behind the file-watch table's notification entry.
///
/// Runs on the notifying thread. On success the new payload is installed
/// atomically and initialized; on failure the previous payload stays
/// installed and the error surfaces only through logs.
pub(crate) fn handle_source_file_changed(path: &Path) {
    let Some(runtime) = RUNTIME.get() else {
        tracing::warn!(path = %path.display(), "file-change notification before startup");
        return;
    };
    match ScriptHost::global().reload(path) {
        Ok(payload) => {
            runtime.application.install(payload);
            runtime.application.initialize();
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                path = %path.display(),
                "reload failed; previous payload remains installed"
            );
        }
    }
}
