//! Root application object the host holds a handle to.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::abi::{CursorPosition, EngineHandle, KeyboardInput};
use crate::payload::ScriptPayload;

/// The single long-lived object the host obtains a handle to at startup.
///
/// Holds the currently installed [`ScriptPayload`] behind an atomic
/// reference swap: [`install`](Self::install) is one atomic store, every
/// forwarding call is one atomic load. A tick racing a reload observes
/// either the fully-old or the fully-new payload, never a partially
/// constructed one, and never blocks on the reload in progress.
pub struct Application {
    payload: ArcSwap<ScriptPayload>,
}

impl Application {
    /// Create an application with a detached payload installed.
    pub fn new() -> Self {
        Self {
            payload: ArcSwap::from_pointee(ScriptPayload::detached()),
        }
    }

    /// Atomically replace the installed payload.
    pub fn install(&self, payload: ScriptPayload) {
        self.payload.store(Arc::new(payload));
    }

    /// Reinstall the detached payload, dropping the reference to the
    /// previous one.
    pub fn detach(&self) {
        self.install(ScriptPayload::detached());
    }

    /// Check whether the installed payload still reaches a live instance.
    pub fn payload_is_alive(&self) -> bool {
        self.payload.load().is_alive()
    }

    /// Forward an initialize call to the current payload.
    pub fn initialize(&self) {
        self.payload.load().initialize();
    }

    /// Forward a frame tick to the current payload.
    pub fn tick(&self, engine: EngineHandle) {
        self.payload.load().tick(engine);
    }

    /// Forward a keyboard event to the current payload.
    pub fn keyboard_input(&self, input: KeyboardInput) {
        self.payload.load().keyboard_input(input);
    }

    /// Forward a cursor movement to the current payload.
    pub fn cursor_moved(&self, position: CursorPosition) {
        self.payload.load().cursor_moved(position);
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("payload_alive", &self.payload_is_alive())
            .finish()
    }
}
