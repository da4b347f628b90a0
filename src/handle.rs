//! Opaque handle registry for objects referenced by the native host.
//!
//! The host never sees a Rust reference. It receives an address-sized token
//! from [`HandleRegistry::issue`], stores it, and passes it back as the first
//! argument of every dispatch-table call. The registration alone keeps the
//! object alive; releasing the handle is the only way to let it go.
//!
//! Resolving a token that was never issued, was already released, or names an
//! object of a different type is a host-side bug that cannot be continued
//! past: the resolver logs and aborts instead of returning garbage or
//! unwinding across the ABI boundary.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Opaque, address-sized token exchanged with the native host in place of a
/// direct reference.
///
/// Token zero is never issued, so it can serve as a null value on the native
/// side. Tokens are drawn from a monotonic counter and never reused for a
/// different object.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(usize);

impl RawHandle {
    /// Reinterpret a raw token received from the host.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The token value as passed across the ABI.
    pub const fn as_raw(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for RawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

static GLOBAL: Lazy<HandleRegistry> = Lazy::new(HandleRegistry::new);

/// The process-global registry backing the dispatch-table wrappers.
pub fn global() -> &'static HandleRegistry {
    &GLOBAL
}

/// Registry mapping opaque tokens to strong references.
///
/// The dispatch wrappers use the process-global instance ([`global`]);
/// independent instances exist for tests and embedding.
pub struct HandleRegistry {
    next: AtomicUsize,
    entries: DashMap<RawHandle, Arc<dyn Any + Send + Sync>>,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(1),
            entries: DashMap::new(),
        }
    }

    /// Register an object and return its token.
    ///
    /// The registry holds a strong reference until [`release`](Self::release)
    /// is called with the returned token.
    pub fn issue<T: Any + Send + Sync>(&self, object: Arc<T>) -> RawHandle {
        let handle = RawHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(handle, object);
        tracing::trace!(handle = %handle, "handle issued");
        handle
    }

    /// Recover the registered object, or `None` for an unknown token or a
    /// type mismatch.
    ///
    /// Host-internal callers and tests use this; the ABI wrappers use the
    /// aborting [`resolve`](Self::resolve).
    pub fn try_resolve<T: Any + Send + Sync>(&self, handle: RawHandle) -> Option<Arc<T>> {
        let entry = self.entries.get(&handle)?;
        Arc::clone(entry.value()).downcast::<T>().ok()
    }

    /// Recover the registered object, aborting the process on an unknown
    /// token or a type mismatch.
    ///
    /// The caller is untrusted native code that cannot be asked to retry, so
    /// a bad token is unrecoverable. Abort does not unwind, which keeps the
    /// ABI boundary safe.
    pub fn resolve<T: Any + Send + Sync>(&self, handle: RawHandle) -> Arc<T> {
        match self.try_resolve(handle) {
            Some(object) => object,
            None => fatal_handle_violation(handle, "resolve"),
        }
    }

    /// Drop the registration, or report `false` for an unknown token.
    pub fn try_release(&self, handle: RawHandle) -> bool {
        let released = self.entries.remove(&handle).is_some();
        if released {
            tracing::trace!(handle = %handle, "handle released");
        }
        released
    }

    /// Drop the registration, aborting the process on an unknown token.
    ///
    /// Releasing a handle twice is the same misuse class as resolving a
    /// stale one.
    pub fn release(&self, handle: RawHandle) {
        if !self.try_release(handle) {
            fatal_handle_violation(handle, "release");
        }
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry has no live registrations.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.entries.len())
            .finish()
    }
}

fn fatal_handle_violation(handle: RawHandle, operation: &str) -> ! {
    tracing::error!(
        handle = %handle,
        operation,
        "unknown or stale handle received from the host; aborting"
    );
    std::process::abort()
}
