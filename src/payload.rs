//! Weak-reference indirection between the application and the current
//! script instance.

use std::sync::{Arc, Weak};

use crate::abi::{CursorPosition, EngineHandle, KeyboardInput};
use crate::module::ScriptInstance;

/// Forwarding wrapper that turns "module was unloaded" into silent no-ops.
///
/// Holds only a [`Weak`] to the script instance, so it never keeps a module
/// alive and never points at freed memory: every forwarded call upgrades
/// first and returns normally when the instance is gone. A frame that
/// arrives during a reload race degrades gracefully instead of crashing the
/// host.
#[derive(Clone)]
pub struct ScriptPayload {
    instance: Weak<ScriptInstance>,
}

impl ScriptPayload {
    /// Wrap a live script instance.
    pub fn new(instance: &Arc<ScriptInstance>) -> Self {
        Self {
            instance: Arc::downgrade(instance),
        }
    }

    /// A payload that was never attached to an instance.
    ///
    /// The application's installed payload before the first successful load.
    pub fn detached() -> Self {
        Self {
            instance: Weak::new(),
        }
    }

    /// Check whether the underlying instance still exists.
    pub fn is_alive(&self) -> bool {
        self.instance.strong_count() > 0
    }

    fn try_get(&self) -> Option<Arc<ScriptInstance>> {
        self.instance.upgrade()
    }

    /// Forward an initialize call; no-op when dead.
    pub fn initialize(&self) {
        if let Some(instance) = self.try_get() {
            instance.initialize();
        }
    }

    /// Forward a frame tick; no-op when dead.
    pub fn tick(&self, engine: EngineHandle) {
        if let Some(instance) = self.try_get() {
            instance.tick(engine);
        }
    }

    /// Forward a keyboard event; no-op when dead.
    pub fn keyboard_input(&self, input: KeyboardInput) {
        if let Some(instance) = self.try_get() {
            instance.keyboard_input(input);
        }
    }

    /// Forward a cursor movement; no-op when dead.
    pub fn cursor_moved(&self, position: CursorPosition) {
        if let Some(instance) = self.try_get() {
            instance.cursor_moved(position);
        }
    }
}

impl Default for ScriptPayload {
    fn default() -> Self {
        Self::detached()
    }
}

impl std::fmt::Debug for ScriptPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPayload")
            .field("alive", &self.is_alive())
            .finish()
    }
}
