//! Error types for script host operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, unloading, or reloading a script
/// module.
///
/// Everything here is recoverable from the host's point of view: a failed
/// reload leaves the lifecycle state machine consistent and is reported
/// through logs, never as an unwound panic across the ABI boundary. Handle
/// misuse by the native side is *not* represented here — it aborts the
/// process (see [`crate::HandleRegistry`]).
#[derive(Error, Debug)]
pub enum Error {
    /// No pending module path has been recorded.
    #[error("no pending module path set")]
    PathUnset,

    /// The module artifact does not exist on disk.
    #[error("module artifact not found: {0}")]
    ModuleNotFound(PathBuf),

    /// The dynamic library failed to load.
    #[error("library load failed: {0}")]
    LibraryLoad(String),

    /// The module does not export the discovery symbol.
    #[error("missing export symbol {symbol:?}: {reason}")]
    MissingExportSymbol {
        /// Symbol the loader looked for.
        symbol: String,
        /// Underlying resolution failure.
        reason: String,
    },

    /// The module's export list contains no script vtable.
    #[error("no script implementation exported by {0}")]
    NoScriptExport(PathBuf),

    /// The module was built against a different ABI revision.
    #[error("ABI version mismatch: module exports {actual}, host expects {expected}")]
    AbiMismatch {
        /// Version the host was built with.
        expected: u32,
        /// Version the module reported.
        actual: u32,
    },

    /// The script instance could not be constructed.
    #[error("script instantiation failed: {0}")]
    InstantiationFailed(String),

    /// An operation was attempted in the wrong lifecycle state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },

    /// The load context has been told to unload and cannot load again.
    #[error("load context is retired")]
    ContextRetired,

    /// A native dependency could not be resolved.
    #[error("native dependency not found: {0}")]
    DependencyNotFound(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Watch error.
    #[cfg(feature = "watch")]
    #[error("watch error: {0}")]
    Watch(String),
}

impl Error {
    /// Create a module not found error.
    pub fn module_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ModuleNotFound(path.into())
    }

    /// Create a library load error.
    pub fn library_load(err: impl ToString) -> Self {
        Self::LibraryLoad(err.to_string())
    }

    /// Create a missing export symbol error.
    pub fn missing_export(symbol: impl Into<String>, reason: impl ToString) -> Self {
        Self::MissingExportSymbol {
            symbol: symbol.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an ABI mismatch error.
    pub fn abi_mismatch(expected: u32, actual: u32) -> Self {
        Self::AbiMismatch { expected, actual }
    }

    /// Create an instantiation failed error.
    pub fn instantiation_failed(msg: impl Into<String>) -> Self {
        Self::InstantiationFailed(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns true if a reload failing with this error leaves the previous
    /// module still loaded and in service.
    ///
    /// Failures detected before the old module is torn down (missing file,
    /// unset path, wrong state) are inert; failures after teardown leave the
    /// lifecycle manager empty and the orphaned payload degrading to no-ops.
    pub fn retains_active_module(&self) -> bool {
        matches!(
            self,
            Self::PathUnset | Self::ModuleNotFound(_) | Self::InvalidState { .. }
        )
    }
}
