//! Hot-reload lifecycle tests against real compiled module artifacts.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use script_host_runtime::{
    Application, EngineHandle, Error, HostConfig, HostEvent, ModuleState, ScriptHost,
    UnloadOutcome,
};

use common::{
    compile_module, compile_module_with_abi_version, compile_module_with_sleep,
    compile_multi_export_module, compile_plain_library, read_counter,
};

fn test_host() -> ScriptHost {
    ScriptHost::new(HostConfig::new().with_unload_retry_delay(Duration::from_millis(1)))
}

#[test]
fn reload_switches_modules_and_preserves_counters() {
    let dir = tempfile::tempdir().unwrap();
    let module_a = compile_module(dir.path(), "mod_a", 1);
    let module_b = compile_module(dir.path(), "mod_b", -1);

    let host = test_host();
    let application = Application::new();

    // Load A: its tick increments the shared counter.
    let payload = host.reload(&module_a.path).unwrap();
    application.install(payload);
    application.initialize();
    assert_eq!(read_counter(&module_a.init), 1);

    for _ in 0..3 {
        application.tick(EngineHandle::null());
    }
    assert_eq!(read_counter(&module_a.counter), 3);
    assert_eq!(read_counter(&module_a.calls), 3);

    // Swap to B: its tick decrements the same counter.
    let payload = host.reload(&module_b.path).unwrap();
    application.install(payload);
    application.initialize();

    application.tick(EngineHandle::null());
    application.tick(EngineHandle::null());

    assert_eq!(read_counter(&module_b.counter), 1);
    assert_eq!(read_counter(&module_b.calls), 2);
    // A received no further calls after the reload, and was torn down.
    assert_eq!(read_counter(&module_a.calls), 3);
    assert_eq!(read_counter(&module_a.teardown), 1);

    let stats = host.stats();
    assert_eq!(stats.state, ModuleState::Active);
    assert_eq!(stats.reload_count, 2);
    assert_eq!(stats.active_path.as_deref(), Some(module_b.path.as_path()));
}

#[test]
fn failed_reload_is_inert() {
    let dir = tempfile::tempdir().unwrap();
    let module_a = compile_module(dir.path(), "inert_a", 1);

    let host = test_host();
    let application = Application::new();

    let payload = host.reload(&module_a.path).unwrap();
    application.install(payload);
    application.tick(EngineHandle::null());
    assert_eq!(read_counter(&module_a.counter), 1);

    // The artifact is missing, so the reload fails before the active module
    // is touched.
    let result = host.reload(dir.path().join("missing.so"));
    assert!(matches!(result, Err(Error::ModuleNotFound(_))));

    assert_eq!(host.state(), ModuleState::Active);
    assert_eq!(
        host.active_module().map(|m| m.path),
        Some(module_a.path.clone())
    );

    // Ticks still reach A's instance unchanged.
    application.tick(EngineHandle::null());
    assert_eq!(read_counter(&module_a.counter), 2);
    assert_eq!(read_counter(&module_a.teardown), 0);
}

#[test]
fn dead_payload_is_silent_after_unload() {
    let dir = tempfile::tempdir().unwrap();
    let module = compile_module(dir.path(), "silent", 1);

    let host = test_host();
    let application = Application::new();

    let payload = host.reload(&module.path).unwrap();
    application.install(payload);
    application.tick(EngineHandle::null());
    assert_eq!(read_counter(&module.counter), 1);

    assert_eq!(host.unload_active(), UnloadOutcome::Released);
    assert_eq!(host.state(), ModuleState::Empty);
    assert_eq!(read_counter(&module.teardown), 1);

    // The orphaned payload returns normally and performs no work.
    assert!(!application.payload_is_alive());
    application.tick(EngineHandle::null());
    application.tick(EngineHandle::null());
    application.initialize();
    assert_eq!(read_counter(&module.counter), 1);
    assert_eq!(read_counter(&module.calls), 1);
}

#[test]
fn unload_when_empty_stays_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let module = compile_module(dir.path(), "idem", 1);

    let host = test_host();
    let _payload = host.reload(&module.path).unwrap();

    assert_eq!(host.unload_active(), UnloadOutcome::Released);
    assert_eq!(host.unload_active(), UnloadOutcome::Idle);
    assert_eq!(host.unload_active(), UnloadOutcome::Idle);
    assert_eq!(host.state(), ModuleState::Empty);
}

#[test]
fn modules_never_overlap_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let module_a = compile_module(dir.path(), "seq_a", 1);
    let module_b = compile_module(dir.path(), "seq_b", 1);

    let host = test_host();
    let order = Arc::new(Mutex::new(Vec::new()));
    let order_clone = Arc::clone(&order);
    host.on_event(move |event| {
        order_clone
            .lock()
            .unwrap()
            .push(event.event_name().to_string());
    });

    host.reload(&module_a.path).unwrap();
    host.reload(&module_b.path).unwrap();
    host.unload_active();

    // The old module is fully unloaded before the new one loads.
    let order = order.lock().unwrap();
    assert_eq!(
        order.as_slice(),
        [
            "loaded",
            "reloaded",
            "unloaded",
            "loaded",
            "reloaded",
            "unloaded"
        ]
    );
}

#[test]
fn set_pending_path_then_load_pending() {
    let dir = tempfile::tempdir().unwrap();
    let module = compile_module(dir.path(), "pending", 1);

    let host = test_host();
    host.set_pending_path(&module.path);
    assert_eq!(host.pending_path().as_deref(), Some(module.path.as_path()));
    assert_eq!(host.state(), ModuleState::Empty);

    let payload = host.load_pending().unwrap();
    assert!(payload.is_alive());
    assert_eq!(host.state(), ModuleState::Active);

    // Loading again without unloading is rejected.
    assert!(matches!(
        host.load_pending(),
        Err(Error::InvalidState { .. })
    ));
    assert_eq!(host.state(), ModuleState::Active);
}

#[test]
fn first_declared_export_wins() {
    let dir = tempfile::tempdir().unwrap();
    let (path, first, second) = compile_multi_export_module(dir.path(), "multi");

    let host = test_host();
    let application = Application::new();

    let payload = host.reload(&path).unwrap();
    application.install(payload);
    application.tick(EngineHandle::null());

    assert!(first.is_file());
    assert!(!second.is_file());
}

#[test]
fn abi_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let module = compile_module_with_abi_version(dir.path(), "future", 999);

    let host = test_host();
    let result = host.reload(&module.path);

    assert!(matches!(
        result,
        Err(Error::AbiMismatch { actual: 999, .. })
    ));
    assert_eq!(host.state(), ModuleState::Empty);
}

#[test]
fn library_without_discovery_symbol_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = compile_plain_library(dir.path(), "plain");

    let host = test_host();
    let result = host.reload(&path);

    assert!(matches!(result, Err(Error::MissingExportSymbol { .. })));
    assert_eq!(host.state(), ModuleState::Empty);
}

#[test]
fn unload_waits_for_in_flight_tick() {
    let dir = tempfile::tempdir().unwrap();
    let module = compile_module_with_sleep(dir.path(), "slow", 1, 100);

    let host = ScriptHost::new(
        HostConfig::new()
            .with_max_unload_passes(50)
            .with_unload_retry_delay(Duration::from_millis(10)),
    );
    let application = Arc::new(Application::new());

    let payload = host.reload(&module.path).unwrap();
    application.install(payload);

    let ticker = {
        let application = Arc::clone(&application);
        std::thread::spawn(move || {
            application.tick(EngineHandle::null());
        })
    };

    // Let the tick enter the module before unloading underneath it.
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(host.unload_active(), UnloadOutcome::Released);

    ticker.join().unwrap();
    assert_eq!(read_counter(&module.counter), 1);
    assert_eq!(read_counter(&module.teardown), 1);
    assert!(!application.payload_is_alive());
}

#[test]
fn exhausted_unload_bound_reports_leak() {
    let dir = tempfile::tempdir().unwrap();
    let module = compile_module_with_sleep(dir.path(), "stuck", 1, 300);

    let host = ScriptHost::new(
        HostConfig::new()
            .with_max_unload_passes(3)
            .with_unload_retry_delay(Duration::from_millis(1)),
    );
    let application = Arc::new(Application::new());

    let leaks = Arc::new(AtomicUsize::new(0));
    let leaks_clone = Arc::clone(&leaks);
    host.on_event(move |event| {
        if matches!(event, HostEvent::UnloadLeaked { .. }) {
            leaks_clone.fetch_add(1, Ordering::Relaxed);
        }
    });

    let payload = host.reload(&module.path).unwrap();
    application.install(payload);

    let ticker = {
        let application = Arc::clone(&application);
        std::thread::spawn(move || {
            application.tick(EngineHandle::null());
        })
    };

    std::thread::sleep(Duration::from_millis(50));

    // The in-flight tick outlives the bound; the manager logs a leak and
    // proceeds instead of stalling.
    assert_eq!(host.unload_active(), UnloadOutcome::Leaked);
    assert_eq!(host.state(), ModuleState::Empty);
    assert_eq!(leaks.load(Ordering::Relaxed), 1);

    // Once the straggler finishes, the module is torn down for real.
    ticker.join().unwrap();
    assert_eq!(read_counter(&module.teardown), 1);
}

#[test]
fn keyboard_events_reach_the_instance() {
    let dir = tempfile::tempdir().unwrap();
    let module = compile_module(dir.path(), "keys", 1);

    let host = test_host();
    let application = Application::new();

    let payload = host.reload(&module.path).unwrap();
    application.install(payload);

    application.keyboard_input(script_host_runtime::KeyboardInput {
        virtual_key_code: 32,
        state: script_host_runtime::KEY_STATE_PRESSED,
    });
    application.keyboard_input(script_host_runtime::KeyboardInput {
        virtual_key_code: 32,
        state: script_host_runtime::KEY_STATE_RELEASED,
    });
    application.cursor_moved(script_host_runtime::CursorPosition { x: 4.0, y: 2.0 });

    // Only the press is counted by the module.
    assert_eq!(read_counter(&module.keys), 1);
}
