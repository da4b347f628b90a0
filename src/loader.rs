//! Module loading and validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::abi::ABI_VERSION;
use crate::context::LoadContext;
use crate::error::{Error, Result};
use crate::module::{ModuleInfo, ScriptInstance, ScriptVTable};

/// Configuration for the module loader.
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Names of native dependencies already resolvable in the host process.
    /// These are never loaded a second time (see
    /// [`crate::DependencyResolution::Shared`]).
    pub shared_dependencies: Vec<String>,
    /// Base path for resolving relative module paths.
    pub base_path: Option<PathBuf>,
}

impl LoaderConfig {
    /// Create a new loader configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one host-shared native dependency.
    pub fn with_shared_dependency(mut self, name: impl Into<String>) -> Self {
        self.shared_dependencies.push(name.into());
        self
    }

    /// Set the base path.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }
}

/// A successfully loaded module: its context, the constructed script
/// instance, and bookkeeping info.
pub struct LoadedModule {
    info: ModuleInfo,
    context: Arc<LoadContext>,
    instance: Arc<ScriptInstance>,
}

impl LoadedModule {
    /// Bookkeeping information about the load.
    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// The context keeping the module's code loaded.
    pub fn context(&self) -> &Arc<LoadContext> {
        &self.context
    }

    /// The constructed script instance.
    pub fn instance(&self) -> &Arc<ScriptInstance> {
        &self.instance
    }

    pub(crate) fn into_parts(self) -> (ModuleInfo, Arc<LoadContext>, Arc<ScriptInstance>) {
        (self.info, self.context, self.instance)
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("info", &self.info)
            .finish()
    }
}

/// Loads one module artifact and resolves its script implementation.
pub struct ModuleLoader {
    config: LoaderConfig,
}

impl ModuleLoader {
    /// Create a new module loader.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Get the loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Resolve a possibly relative module path against the configured base.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(ref base) = self.config.base_path {
            base.join(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Load the module at `path`, validate its exports, and construct the
    /// first declared script implementation.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedModule> {
        let path = self.resolve_path(path.as_ref());
        if !path.is_file() {
            return Err(Error::module_not_found(path));
        }

        let context = Arc::new(LoadContext::new(
            &path,
            self.config.shared_dependencies.clone(),
        ));
        context.load()?;

        let exports = context.script_exports()?;
        if exports.abi_version != ABI_VERSION {
            return Err(Error::abi_mismatch(ABI_VERSION, exports.abi_version));
        }
        if exports.len == 0 || exports.vtables.is_null() {
            return Err(Error::NoScriptExport(path));
        }
        if exports.len > 1 {
            tracing::warn!(
                count = exports.len,
                path = %path.display(),
                "module exports multiple script implementations; using the first declared"
            );
        }

        // SAFETY: len and the pointer were just validated; the vtable array
        // lives in the module's static storage, which `context` keeps
        // loaded.
        let vtable: ScriptVTable = unsafe { *exports.vtables };

        let instance = Arc::new(ScriptInstance::from_loaded(vtable, Arc::clone(&context))?);
        tracing::info!(path = %path.display(), "script module loaded");

        Ok(LoadedModule {
            info: ModuleInfo::new(path),
            context,
            instance,
        })
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("config", &self.config)
            .finish()
    }
}
