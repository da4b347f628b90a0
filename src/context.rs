//! Isolated, unloadable container for one version of a script module.
//!
//! A [`LoadContext`] owns the module's dynamic library and any module-local
//! native dependencies it loads on the module's behalf, resolving dependency
//! names relative to the module's own location rather than the host's.
//! Telling a context to [`unload`](LoadContext::unload) is a one-way door:
//! it can never load again, and actual teardown completes only when the last
//! strong reference to the context drops — observed externally through a
//! `Weak` by the lifecycle manager.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use libloading::Library;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::module::{ScriptExports, ScriptExportsFn, SCRIPT_EXPORTS_SYMBOL};

/// Platform file name of a native library, `name` → `libname.so` /
/// `name.dll` / `libname.dylib`.
pub fn native_library_filename(name: &str) -> String {
    let prefix = if cfg!(target_os = "windows") { "" } else { "lib" };
    let extension = if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    };
    format!("{prefix}{name}.{extension}")
}

/// Where a native dependency name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyResolution {
    /// Already resolvable in the host process. Loading a second copy is
    /// forbidden (it would duplicate type identities), so the context
    /// reuses the host's copy without loading anything.
    Shared,
    /// A platform-named artifact next to the module.
    ModuleLocal(PathBuf),
}

/// Isolated load context for one module version.
pub struct LoadContext {
    module_path: PathBuf,
    shared_dependencies: Vec<String>,
    library: Mutex<Option<Library>>,
    dependencies: Mutex<Vec<(String, Library)>>,
    retired: AtomicBool,
}

impl LoadContext {
    /// Create a context for the module at `module_path`.
    ///
    /// `shared_dependencies` names the native libraries already resolvable
    /// in the host process; they take priority over module-local files.
    pub fn new(module_path: impl Into<PathBuf>, shared_dependencies: Vec<String>) -> Self {
        Self {
            module_path: module_path.into(),
            shared_dependencies,
            library: Mutex::new(None),
            dependencies: Mutex::new(Vec::new()),
            retired: AtomicBool::new(false),
        }
    }

    /// Path of the module artifact this context was created for.
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Whether the context has been told to unload.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Whether the module library is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.library.lock().is_some()
    }

    /// Load the module artifact.
    pub fn load(&self) -> Result<()> {
        if self.is_retired() {
            return Err(Error::ContextRetired);
        }
        let mut library = self.library.lock();
        if library.is_some() {
            return Err(Error::invalid_state("no module loaded", "module loaded"));
        }
        tracing::debug!(path = %self.module_path.display(), "loading module library");
        // SAFETY: loading a library runs its initializers; the module is
        // trusted code supplied by the embedder, same trust level as the
        // host process itself.
        let loaded = unsafe { Library::new(&self.module_path) }.map_err(Error::library_load)?;
        *library = Some(loaded);
        Ok(())
    }

    /// Resolve a native dependency name without loading it.
    ///
    /// Order: host-shared dependencies first (exact name match), then a
    /// platform-named file next to the module artifact.
    pub fn resolve_dependency(&self, name: &str) -> Result<DependencyResolution> {
        if self.is_retired() {
            return Err(Error::ContextRetired);
        }
        if self.shared_dependencies.iter().any(|shared| shared == name) {
            return Ok(DependencyResolution::Shared);
        }
        let candidate = self.module_dir().join(native_library_filename(name));
        if candidate.is_file() {
            Ok(DependencyResolution::ModuleLocal(candidate))
        } else {
            Err(Error::DependencyNotFound(name.to_string()))
        }
    }

    /// Resolve a native dependency and, for a module-local one, load it and
    /// keep it alive for the context's lifetime.
    ///
    /// A host-shared dependency is never loaded again; its resolution is
    /// returned as-is.
    pub fn load_dependency(&self, name: &str) -> Result<DependencyResolution> {
        let resolution = self.resolve_dependency(name)?;
        if let DependencyResolution::ModuleLocal(path) = &resolution {
            let mut dependencies = self.dependencies.lock();
            if !dependencies.iter().any(|(loaded, _)| loaded == name) {
                tracing::debug!(name, path = %path.display(), "loading module-local dependency");
                // SAFETY: same trust level as the module itself.
                let library = unsafe { Library::new(path) }.map_err(Error::library_load)?;
                dependencies.push((name.to_string(), library));
            }
        }
        Ok(resolution)
    }

    /// Resolve and call the module's discovery symbol.
    pub(crate) fn script_exports(&self) -> Result<ScriptExports> {
        let library = self.library.lock();
        let library = library
            .as_ref()
            .ok_or_else(|| Error::invalid_state("module loaded", "no module loaded"))?;
        // SAFETY: the symbol type is the discovery contract checked by the
        // loader against ABI_VERSION before anything else is trusted.
        let symbol: libloading::Symbol<'_, ScriptExportsFn> =
            unsafe { library.get(SCRIPT_EXPORTS_SYMBOL.as_bytes()) }
                .map_err(|err| Error::missing_export(SCRIPT_EXPORTS_SYMBOL, err))?;
        Ok(symbol())
    }

    /// Begin teardown.
    ///
    /// One-way: further loads fail with [`Error::ContextRetired`]. The
    /// libraries are actually released when the last `Arc<LoadContext>`
    /// drops; completion is observed externally through a `Weak`.
    pub fn unload(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            tracing::debug!(path = %self.module_path.display(), "load context retired");
        }
    }

    fn module_dir(&self) -> &Path {
        self.module_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl Drop for LoadContext {
    fn drop(&mut self) {
        tracing::trace!(path = %self.module_path.display(), "load context torn down");
    }
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("module_path", &self.module_path)
            .field("loaded", &self.is_loaded())
            .field("retired", &self.is_retired())
            .finish()
    }
}
