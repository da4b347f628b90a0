//! ABI dispatch tables and wire types shared with the native host.
//!
//! One table exists per host-visible capability. Each table is a fixed
//! `#[repr(C)]` sequence of `extern "C"` function-pointer slots, written once
//! into host-owned memory by the entry point and never mutated afterwards.
//! Field order and signatures are a binary contract with the independently
//! compiled host; any change requires bumping [`ABI_VERSION`].
//!
//! Every wrapper resolves its handle argument through the global
//! [`crate::HandleRegistry`] instance, forwards to the application, and is shielded
//! by [`catch_unwind`](std::panic::catch_unwind) so no panic ever unwinds
//! into the host. One-way notifications report failures through logs only.

use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::application::Application;
use crate::handle::{self, RawHandle};

/// Revision of the binary contract between host, runtime, and modules.
///
/// Checked against the value reported by each loaded module's export list.
pub const ABI_VERSION: u32 = 1;

/// Wire value of [`KeyboardInput::state`] for a released key.
pub const KEY_STATE_RELEASED: u32 = 0;

/// Wire value of [`KeyboardInput::state`] for a pressed key.
pub const KEY_STATE_PRESSED: u32 = 1;

/// Keyboard event payload as delivered by the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardInput {
    /// Platform virtual key code.
    pub virtual_key_code: u32,
    /// [`KEY_STATE_PRESSED`] or [`KEY_STATE_RELEASED`].
    pub state: u32,
}

impl KeyboardInput {
    /// Check whether this event reports a key press.
    pub fn is_pressed(&self) -> bool {
        self.state == KEY_STATE_PRESSED
    }
}

/// Cursor position in physical pixels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPosition {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

/// Opaque host-side engine object threaded through every tick call.
///
/// The runtime never dereferences it; it is handed through to the script
/// instance, which passes it back into host calls.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHandle(*mut c_void);

impl EngineHandle {
    /// The null engine handle.
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    /// Wrap a raw pointer received from the host.
    pub const fn from_raw(raw: *mut c_void) -> Self {
        Self(raw)
    }

    /// The raw pointer value.
    pub const fn as_raw(self) -> *mut c_void {
        self.0
    }

    /// Check whether the handle is null.
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Structure the host passes to the entry point, to be filled with the root
/// application handle and one dispatch table per capability.
///
/// The host owns this memory; the runtime only writes into it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EntryInfo {
    /// Handle of the root application object.
    pub application: RawHandle,
    /// Application lifecycle capability.
    pub lifecycle: LifecycleFunctions,
    /// Keyboard and cursor input capability.
    pub input: InputFunctions,
    /// Per-frame tick capability.
    pub tick: TickFunctions,
    /// File-change notification capability.
    pub file_watch: FileWatchFunctions,
}

/// Application lifecycle dispatch table.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LifecycleFunctions {
    /// Forward an initialize request to the application's current payload.
    pub initialize: extern "C" fn(RawHandle),
    /// Unload the active module, detach the payload, and release the root
    /// application handle.
    pub shutdown: extern "C" fn(RawHandle),
}

impl LifecycleFunctions {
    /// Build the table wired to the runtime's wrappers.
    pub fn new() -> Self {
        Self {
            initialize: application_initialize,
            shutdown: application_shutdown,
        }
    }
}

impl Default for LifecycleFunctions {
    fn default() -> Self {
        Self::new()
    }
}

/// Input dispatch table.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InputFunctions {
    /// Forward a keyboard event.
    pub keyboard_input: extern "C" fn(RawHandle, KeyboardInput),
    /// Forward a cursor movement.
    pub cursor_moved: extern "C" fn(RawHandle, CursorPosition),
}

impl InputFunctions {
    /// Build the table wired to the runtime's wrappers.
    pub fn new() -> Self {
        Self {
            keyboard_input: application_keyboard_input,
            cursor_moved: application_cursor_moved,
        }
    }
}

impl Default for InputFunctions {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-frame tick dispatch table.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TickFunctions {
    /// Forward a frame tick, passing the opaque engine object through.
    pub tick: extern "C" fn(RawHandle, EngineHandle),
}

impl TickFunctions {
    /// Build the table wired to the runtime's wrappers.
    pub fn new() -> Self {
        Self {
            tick: application_tick,
        }
    }
}

impl Default for TickFunctions {
    fn default() -> Self {
        Self::new()
    }
}

/// File-change notification dispatch table.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FileWatchFunctions {
    /// One-way notification that the module artifact at the given
    /// NUL-terminated UTF-8 path changed. Triggers a reload on the calling
    /// thread; failures surface only through logs.
    pub source_file_changed: extern "C" fn(*const c_char),
}

impl FileWatchFunctions {
    /// Build the table wired to the runtime's wrappers.
    pub fn new() -> Self {
        Self { source_file_changed }
    }
}

impl Default for FileWatchFunctions {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a boundary callback, converting any panic into a logged error.
///
/// Unwinding across an `extern "C"` frame into the host is undefined
/// behavior; this is the last line of defense.
pub(crate) fn ffi_guard<F: FnOnce()>(operation: &'static str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(operation, "panic caught at the ABI boundary");
    }
}

extern "C" fn application_initialize(application: RawHandle) {
    ffi_guard("initialize", || {
        handle::global()
            .resolve::<Application>(application)
            .initialize();
    });
}

extern "C" fn application_shutdown(application: RawHandle) {
    ffi_guard("shutdown", || {
        crate::entry::shutdown_application(application);
    });
}

extern "C" fn application_tick(application: RawHandle, engine: EngineHandle) {
    ffi_guard("tick", || {
        handle::global()
            .resolve::<Application>(application)
            .tick(engine);
    });
}

extern "C" fn application_keyboard_input(application: RawHandle, input: KeyboardInput) {
    ffi_guard("keyboard_input", || {
        handle::global()
            .resolve::<Application>(application)
            .keyboard_input(input);
    });
}

extern "C" fn application_cursor_moved(application: RawHandle, position: CursorPosition) {
    ffi_guard("cursor_moved", || {
        handle::global()
            .resolve::<Application>(application)
            .cursor_moved(position);
    });
}

extern "C" fn source_file_changed(path: *const c_char) {
    ffi_guard("source_file_changed", || {
        if path.is_null() {
            tracing::warn!("file-change notification carried a null path");
            return;
        }
        let raw = unsafe { CStr::from_ptr(path) };
        match raw.to_str() {
            Ok(path) => crate::entry::handle_source_file_changed(Path::new(path)),
            Err(_) => {
                tracing::warn!("file-change notification carried a non-UTF-8 path");
            }
        }
    });
}
