//! Simulated native host driving the script runtime in-process.
//!
//! With no arguments it demonstrates detached no-op forwarding; given the
//! path of a module artifact it loads, drives, and unloads it.
//!
//! Run with: cargo run --example host_simulator -- ./libscript_module.so

use std::time::Duration;

use script_host_runtime::{Application, EngineHandle, HostConfig, ScriptHost};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let host = ScriptHost::new(HostConfig::default());
    let application = Application::new();

    let Some(module_path) = std::env::args().nth(1) else {
        info!("no module path given; demonstrating detached no-op forwarding");
        for frame in 0..3 {
            info!(frame, "tick with no payload installed");
            application.tick(EngineHandle::null());
        }
        info!("pass a module artifact path to load and drive a real script");
        return Ok(());
    };

    let payload = host.reload(&module_path)?;
    application.install(payload);
    application.initialize();
    info!(path = %module_path, "module loaded and installed");

    for frame in 0..5 {
        info!(frame, "tick");
        application.tick(EngineHandle::null());
        std::thread::sleep(Duration::from_millis(16));
    }

    let outcome = host.unload_active();
    info!(?outcome, "module unloaded");

    // Ticks after unload degrade to silent no-ops.
    application.tick(EngineHandle::null());
    info!(stats = ?host.stats(), "final state");

    Ok(())
}
