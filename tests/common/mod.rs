//! Helpers that compile real script module artifacts for integration tests.
//!
//! Each module is a single-file `cdylib` built with `rustc` into a scratch
//! directory. The generated source hand-rolls the wire structs so the
//! artifact depends on nothing but the documented ABI, exactly like a
//! module produced by an out-of-tree build.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use script_host_runtime::native_library_filename;

const MODULE_TEMPLATE: &str = r#"
#![allow(dead_code)]

use std::ffi::c_void;

#[repr(C)]
pub struct KeyboardInput {
    pub virtual_key_code: u32,
    pub state: u32,
}

#[repr(C)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

#[repr(transparent)]
pub struct EngineHandle(pub *mut c_void);

#[repr(C)]
pub struct ScriptVTable {
    pub create: extern "C" fn() -> *mut c_void,
    pub initialize: extern "C" fn(*mut c_void),
    pub tick: extern "C" fn(*mut c_void, EngineHandle),
    pub keyboard_input: extern "C" fn(*mut c_void, KeyboardInput),
    pub cursor_moved: extern "C" fn(*mut c_void, CursorPosition),
    pub teardown: extern "C" fn(*mut c_void),
}

#[repr(C)]
pub struct ScriptExports {
    pub abi_version: u32,
    pub len: usize,
    pub vtables: *const ScriptVTable,
}

struct State;

fn bump(path: &str, delta: i64) {
    let current = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0);
    let _ = std::fs::write(path, (current + delta).to_string());
}

extern "C" fn create() -> *mut c_void {
    Box::into_raw(Box::new(State)) as *mut c_void
}

extern "C" fn initialize(_state: *mut c_void) {
    bump("@INIT@", 1);
}

extern "C" fn tick(_state: *mut c_void, _engine: EngineHandle) {
    let sleep_ms: u64 = @SLEEP@;
    if sleep_ms > 0 {
        std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
    }
    bump("@COUNTER@", @DELTA@);
    bump("@CALLS@", 1);
}

extern "C" fn keyboard_input(_state: *mut c_void, input: KeyboardInput) {
    if input.state == 1 {
        bump("@KEYS@", 1);
    }
}

extern "C" fn cursor_moved(_state: *mut c_void, _position: CursorPosition) {}

extern "C" fn teardown(state: *mut c_void) {
    if !state.is_null() {
        drop(unsafe { Box::from_raw(state as *mut State) });
        bump("@TEARDOWN@", 1);
    }
}

static VTABLE: ScriptVTable = ScriptVTable {
    create,
    initialize,
    tick,
    keyboard_input,
    cursor_moved,
    teardown,
};

#[no_mangle]
pub extern "C" fn script_module_exports() -> ScriptExports {
    ScriptExports {
        abi_version: @ABI_VERSION@,
        len: 1,
        vtables: &VTABLE as *const ScriptVTable,
    }
}
"#;

const MULTI_EXPORT_TEMPLATE: &str = r#"
#![allow(dead_code)]

use std::ffi::c_void;

#[repr(C)]
pub struct KeyboardInput {
    pub virtual_key_code: u32,
    pub state: u32,
}

#[repr(C)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

#[repr(transparent)]
pub struct EngineHandle(pub *mut c_void);

#[repr(C)]
pub struct ScriptVTable {
    pub create: extern "C" fn() -> *mut c_void,
    pub initialize: extern "C" fn(*mut c_void),
    pub tick: extern "C" fn(*mut c_void, EngineHandle),
    pub keyboard_input: extern "C" fn(*mut c_void, KeyboardInput),
    pub cursor_moved: extern "C" fn(*mut c_void, CursorPosition),
    pub teardown: extern "C" fn(*mut c_void),
}

#[repr(C)]
pub struct ScriptExports {
    pub abi_version: u32,
    pub len: usize,
    pub vtables: *const ScriptVTable,
}

struct State;

fn touch(path: &str) {
    let _ = std::fs::write(path, "1");
}

extern "C" fn create() -> *mut c_void {
    Box::into_raw(Box::new(State)) as *mut c_void
}

extern "C" fn initialize(_state: *mut c_void) {}

extern "C" fn tick_first(_state: *mut c_void, _engine: EngineHandle) {
    touch("@FIRST@");
}

extern "C" fn tick_second(_state: *mut c_void, _engine: EngineHandle) {
    touch("@SECOND@");
}

extern "C" fn keyboard_input(_state: *mut c_void, _input: KeyboardInput) {}

extern "C" fn cursor_moved(_state: *mut c_void, _position: CursorPosition) {}

extern "C" fn teardown(state: *mut c_void) {
    if !state.is_null() {
        drop(unsafe { Box::from_raw(state as *mut State) });
    }
}

static VTABLES: [ScriptVTable; 2] = [
    ScriptVTable {
        create,
        initialize,
        tick: tick_first,
        keyboard_input,
        cursor_moved,
        teardown,
    },
    ScriptVTable {
        create,
        initialize,
        tick: tick_second,
        keyboard_input,
        cursor_moved,
        teardown,
    },
];

#[no_mangle]
pub extern "C" fn script_module_exports() -> ScriptExports {
    ScriptExports {
        abi_version: @ABI_VERSION@,
        len: 2,
        vtables: VTABLES.as_ptr(),
    }
}
"#;

const PLAIN_LIBRARY_TEMPLATE: &str = r#"
#[no_mangle]
pub extern "C" fn unrelated_symbol() -> u32 {
    42
}
"#;

/// A compiled test module and the files its callbacks write into.
pub struct TestModule {
    /// Path of the compiled artifact.
    pub path: PathBuf,
    /// Shared counter file its tick reads-modifies-writes.
    pub counter: PathBuf,
    /// Per-module tick invocation count.
    pub calls: PathBuf,
    /// Per-module initialize invocation count.
    pub init: PathBuf,
    /// Per-module pressed-key count.
    pub keys: PathBuf,
    /// Per-module teardown invocation count.
    pub teardown: PathBuf,
}

/// Compile a script module whose tick adds `delta` to the shared counter.
pub fn compile_module(dir: &Path, name: &str, delta: i64) -> TestModule {
    compile_module_with_sleep(dir, name, delta, 0)
}

/// Like [`compile_module`], with a tick that sleeps first — used to hold an
/// in-flight call open across an unload.
pub fn compile_module_with_sleep(dir: &Path, name: &str, delta: i64, sleep_ms: u64) -> TestModule {
    compile_module_inner(dir, name, delta, sleep_ms, script_host_runtime::ABI_VERSION)
}

/// Compile a module reporting a foreign ABI version.
pub fn compile_module_with_abi_version(dir: &Path, name: &str, abi_version: u32) -> TestModule {
    compile_module_inner(dir, name, 1, 0, abi_version)
}

fn compile_module_inner(
    dir: &Path,
    name: &str,
    delta: i64,
    sleep_ms: u64,
    abi_version: u32,
) -> TestModule {
    let counter = dir.join("counter.txt");
    let calls = dir.join(format!("calls_{name}.txt"));
    let init = dir.join(format!("init_{name}.txt"));
    let keys = dir.join(format!("keys_{name}.txt"));
    let teardown = dir.join(format!("teardown_{name}.txt"));

    let source = MODULE_TEMPLATE
        .replace("@DELTA@", &delta.to_string())
        .replace("@SLEEP@", &sleep_ms.to_string())
        .replace("@ABI_VERSION@", &abi_version.to_string())
        .replace("@COUNTER@", &path_literal(&counter))
        .replace("@CALLS@", &path_literal(&calls))
        .replace("@INIT@", &path_literal(&init))
        .replace("@KEYS@", &path_literal(&keys))
        .replace("@TEARDOWN@", &path_literal(&teardown));

    let path = compile(dir, name, &source);
    TestModule {
        path,
        counter,
        calls,
        init,
        keys,
        teardown,
    }
}

/// Compile a module exporting two script implementations. Ticking the first
/// touches the first marker, ticking the second touches the second.
pub fn compile_multi_export_module(dir: &Path, name: &str) -> (PathBuf, PathBuf, PathBuf) {
    let first = dir.join(format!("first_{name}.txt"));
    let second = dir.join(format!("second_{name}.txt"));

    let source = MULTI_EXPORT_TEMPLATE
        .replace("@ABI_VERSION@", &script_host_runtime::ABI_VERSION.to_string())
        .replace("@FIRST@", &path_literal(&first))
        .replace("@SECOND@", &path_literal(&second));

    let path = compile(dir, name, &source);
    (path, first, second)
}

/// Compile a shared library that exports no discovery symbol at all.
pub fn compile_plain_library(dir: &Path, name: &str) -> PathBuf {
    compile(dir, name, PLAIN_LIBRARY_TEMPLATE)
}

/// Read a counter file written by a test module, defaulting to zero.
pub fn read_counter(path: &Path) -> i64 {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

fn compile(dir: &Path, name: &str, source: &str) -> PathBuf {
    let source_path = dir.join(format!("{name}.rs"));
    std::fs::write(&source_path, source).unwrap();

    let artifact = dir.join(native_library_filename(name));
    let status = Command::new("rustc")
        .args(["--edition=2021", "--crate-type", "cdylib"])
        .arg(&source_path)
        .arg("-o")
        .arg(&artifact)
        .status()
        .expect("rustc must be available to build test modules");
    assert!(status.success(), "failed to compile test module {name}");
    artifact
}

fn path_literal(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}
