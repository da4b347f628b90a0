//! Script module ABI: capability trait, vtables, discovery exports, and
//! loaded instances.
//!
//! A module artifact exports a single discovery symbol
//! ([`SCRIPT_EXPORTS_SYMBOL`]) returning a [`ScriptExports`]
//! list. Each entry is a [`ScriptVTable`] of `extern "C"` constructors and
//! capability calls over an opaque state pointer. Module crates written in
//! Rust implement [`ScriptModule`] and emit the symbol with
//! [`export_script_modules!`]; the vtable plumbing is generated by
//! [`vtable_of`].

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::abi::{CursorPosition, EngineHandle, KeyboardInput};
use crate::context::LoadContext;
use crate::error::{Error, Result};

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Name of the discovery symbol every module artifact must export.
pub const SCRIPT_EXPORTS_SYMBOL: &str = "script_module_exports";

/// Capability set a script implementation provides to the host.
///
/// Teardown is `Drop`: the instance is destroyed when its module unloads,
/// never explicitly by the host.
pub trait ScriptModule: Send {
    /// Called once after the module is installed, and again after each
    /// successful reload.
    fn initialize(&mut self) {}

    /// Called every frame with the opaque host engine object.
    fn tick(&mut self, engine: EngineHandle) {
        let _ = engine;
    }

    /// Called for each keyboard event.
    fn keyboard_input(&mut self, input: KeyboardInput) {
        let _ = input;
    }

    /// Called for each cursor movement.
    fn cursor_moved(&mut self, position: CursorPosition) {
        let _ = position;
    }
}

impl ScriptModule for Box<dyn ScriptModule> {
    fn initialize(&mut self) {
        (**self).initialize();
    }

    fn tick(&mut self, engine: EngineHandle) {
        (**self).tick(engine);
    }

    fn keyboard_input(&mut self, input: KeyboardInput) {
        (**self).keyboard_input(input);
    }

    fn cursor_moved(&mut self, position: CursorPosition) {
        (**self).cursor_moved(position);
    }
}

/// Function table one script implementation exports across the module
/// boundary.
///
/// `create` returns the opaque state pointer all other entries receive;
/// `teardown` destroys it. Layout is part of the [`crate::ABI_VERSION`]
/// contract.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ScriptVTable {
    /// Construct the script state. Returns null on failure.
    pub create: extern "C" fn() -> *mut c_void,
    /// Initialize after install or reload.
    pub initialize: extern "C" fn(*mut c_void),
    /// Per-frame tick.
    pub tick: extern "C" fn(*mut c_void, EngineHandle),
    /// Keyboard event.
    pub keyboard_input: extern "C" fn(*mut c_void, KeyboardInput),
    /// Cursor movement.
    pub cursor_moved: extern "C" fn(*mut c_void, CursorPosition),
    /// Destroy the script state. Called exactly once.
    pub teardown: extern "C" fn(*mut c_void),
}

/// Value returned by a module's discovery symbol.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ScriptExports {
    /// ABI revision the module was built against.
    pub abi_version: u32,
    /// Number of exported vtables.
    pub len: usize,
    /// Pointer to the first vtable; must stay valid while the module is
    /// loaded.
    pub vtables: *const ScriptVTable,
}

/// Signature of the discovery symbol.
pub type ScriptExportsFn = extern "C" fn() -> ScriptExports;

/// Export one or more [`ScriptModule`] implementations from a module crate.
///
/// Emits the discovery symbol the loader resolves. When more than one type
/// is listed, declaration order is the defined order and the loader
/// instantiates the first one.
///
/// ```rust,ignore
/// use script_host_runtime::{export_script_modules, ScriptModule};
///
/// #[derive(Default)]
/// struct MyScript;
///
/// impl ScriptModule for MyScript {}
///
/// export_script_modules!(MyScript);
/// ```
#[macro_export]
macro_rules! export_script_modules {
    ($($script:ty),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn script_module_exports() -> $crate::ScriptExports {
            static VTABLES: &[$crate::ScriptVTable] =
                &[$($crate::vtable_of::<$script>()),+];
            $crate::ScriptExports {
                abi_version: $crate::ABI_VERSION,
                len: VTABLES.len(),
                vtables: VTABLES.as_ptr(),
            }
        }
    };
}

/// Build the vtable for a [`ScriptModule`] type.
///
/// Usable in constant position, which is what lets
/// [`export_script_modules!`] place the vtables in static storage.
pub const fn vtable_of<T: ScriptModule + Default + 'static>() -> ScriptVTable {
    ScriptVTable {
        create: trampoline::create::<T>,
        initialize: trampoline::initialize::<T>,
        tick: trampoline::tick::<T>,
        keyboard_input: trampoline::keyboard_input::<T>,
        cursor_moved: trampoline::cursor_moved::<T>,
        teardown: trampoline::teardown::<T>,
    }
}

mod trampoline {
    use super::*;

    // Every entry receives a pointer produced by `create::<T>` for the same
    // `T`; the loader never mixes vtables and state pointers from different
    // exports.

    pub(super) extern "C" fn create<T: ScriptModule + Default + 'static>() -> *mut c_void {
        Box::into_raw(Box::new(T::default())) as *mut c_void
    }

    pub(super) extern "C" fn initialize<T: ScriptModule>(state: *mut c_void) {
        unsafe { &mut *(state as *mut T) }.initialize();
    }

    pub(super) extern "C" fn tick<T: ScriptModule>(state: *mut c_void, engine: EngineHandle) {
        unsafe { &mut *(state as *mut T) }.tick(engine);
    }

    pub(super) extern "C" fn keyboard_input<T: ScriptModule>(
        state: *mut c_void,
        input: KeyboardInput,
    ) {
        unsafe { &mut *(state as *mut T) }.keyboard_input(input);
    }

    pub(super) extern "C" fn cursor_moved<T: ScriptModule>(
        state: *mut c_void,
        position: CursorPosition,
    ) {
        unsafe { &mut *(state as *mut T) }.cursor_moved(position);
    }

    pub(super) extern "C" fn teardown<T: ScriptModule>(state: *mut c_void) {
        if !state.is_null() {
            drop(unsafe { Box::from_raw(state as *mut T) });
        }
    }
}

// Embedded instances are constructed in-process, so their vtable's `create`
// slot is never invoked.
extern "C" fn embedded_create() -> *mut c_void {
    std::ptr::null_mut()
}

fn embedded_vtable() -> ScriptVTable {
    type Boxed = Box<dyn ScriptModule>;
    ScriptVTable {
        create: embedded_create,
        initialize: trampoline::initialize::<Boxed>,
        tick: trampoline::tick::<Boxed>,
        keyboard_input: trampoline::keyboard_input::<Boxed>,
        cursor_moved: trampoline::cursor_moved::<Boxed>,
        teardown: trampoline::teardown::<Boxed>,
    }
}

struct StatePtr(*mut c_void);

// SAFETY: the pointer is only dereferenced through the vtable while the
// enclosing mutex is held, and the code behind the vtable stays mapped for
// as long as `ScriptInstance::_context` is alive.
unsafe impl Send for StatePtr {}

/// A constructed script implementation.
///
/// Owned via `Arc` by the lifecycle manager's active-module record; the
/// payload indirection holds only a `Weak` to it. Holding the load context
/// pins the module's code in memory for the instance's lifetime. Calls are
/// serialized through an internal mutex so the host may drive capabilities
/// from more than one thread.
pub struct ScriptInstance {
    vtable: ScriptVTable,
    state: Mutex<StatePtr>,
    _context: Option<Arc<LoadContext>>,
}

impl ScriptInstance {
    /// Instantiate from a vtable resolved out of a loaded module.
    pub(crate) fn from_loaded(vtable: ScriptVTable, context: Arc<LoadContext>) -> Result<Self> {
        let state = (vtable.create)();
        if state.is_null() {
            return Err(Error::instantiation_failed(
                "module constructor returned null",
            ));
        }
        Ok(Self {
            vtable,
            state: Mutex::new(StatePtr(state)),
            _context: Some(context),
        })
    }

    /// Wrap an in-process implementation, bypassing module loading.
    ///
    /// Used by embedders and tests that drive the payload and application
    /// layers without a shared-library artifact.
    pub fn embedded(module: Box<dyn ScriptModule>) -> Self {
        let state = Box::into_raw(Box::new(module)) as *mut c_void;
        Self {
            vtable: embedded_vtable(),
            state: Mutex::new(StatePtr(state)),
            _context: None,
        }
    }

    /// Forward an initialize call.
    pub fn initialize(&self) {
        let state = self.state.lock();
        (self.vtable.initialize)(state.0);
    }

    /// Forward a frame tick.
    pub fn tick(&self, engine: EngineHandle) {
        let state = self.state.lock();
        (self.vtable.tick)(state.0, engine);
    }

    /// Forward a keyboard event.
    pub fn keyboard_input(&self, input: KeyboardInput) {
        let state = self.state.lock();
        (self.vtable.keyboard_input)(state.0, input);
    }

    /// Forward a cursor movement.
    pub fn cursor_moved(&self, position: CursorPosition) {
        let state = self.state.lock();
        (self.vtable.cursor_moved)(state.0, position);
    }
}

impl Drop for ScriptInstance {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if !state.0.is_null() {
            (self.vtable.teardown)(state.0);
            state.0 = std::ptr::null_mut();
        }
    }
}

impl std::fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("loaded", &self._context.is_some())
            .finish()
    }
}

/// Information about a loaded module.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Unique id, monotonic across loads.
    pub id: u64,
    /// Path of the shared-library artifact.
    pub path: PathBuf,
    /// When the module was loaded.
    pub loaded_at: Instant,
}

impl ModuleInfo {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
            path,
            loaded_at: Instant::now(),
        }
    }
}
