//! Module loader
//!
//! Owns every module handle for the run. Modules are searched in the install
//! directory first and the working directory second. A required module that
//! cannot be loaded is reported as a [`LauncherError::RequiredModule`]; an
//! optional one is recorded as [`ModuleStatus::LoadFailed`] and the run
//! continues without it.

use crate::backend::{ModuleBackend, ModuleHandle};
use crate::module::{module_file_name, ModuleDescriptor, ModuleSpec, ModuleStatus};
use crate::symbol::{Binding, EntryPoint, Selector, Signature};
use ks_core::{LauncherError, LoaderError};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// Index of a module inside its loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

/// Loads modules and resolves their exports
pub struct ModuleLoader {
    backend: Box<dyn ModuleBackend>,
    search_dirs: Vec<PathBuf>,
    modules: Vec<ModuleDescriptor>,
    /// Successfully loaded modules, oldest first
    load_order: Vec<ModuleId>,
}

impl ModuleLoader {
    /// Create a loader searching `install_dir`, then the working directory
    pub fn new(backend: impl ModuleBackend + 'static, install_dir: &Path) -> Self {
        let mut search_dirs = vec![install_dir.to_path_buf()];
        match std::env::current_dir() {
            Ok(cwd) if cwd != install_dir => search_dirs.push(cwd),
            Ok(_) => {}
            Err(e) => warn!("Working directory unavailable for module search: {}", e),
        }
        Self::with_search_dirs(backend, search_dirs)
    }

    /// Create a loader with an explicit search order
    pub fn with_search_dirs(backend: impl ModuleBackend + 'static, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            backend: Box::new(backend),
            search_dirs,
            modules: Vec::new(),
            load_order: Vec::new(),
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Load a single module
    ///
    /// Each module goes through Loaded at most once per loader; loading a
    /// name again returns the existing descriptor unchanged.
    pub fn load(&mut self, spec: ModuleSpec) -> Result<ModuleId, LauncherError> {
        if let Some(id) = self.find(spec.name) {
            let desc = &self.modules[id.0];
            debug!("Module {} already known ({})", spec.name, desc.status);
            return match (desc.status, spec.fatal_code()) {
                (ModuleStatus::LoadFailed, Some(code)) => Err(LauncherError::RequiredModule {
                    module: spec.name,
                    code,
                    source: LoaderError::NotLoaded(spec.name.to_string()),
                }),
                _ => Ok(id),
            };
        }

        let id = ModuleId(self.modules.len());
        let mut desc = ModuleDescriptor::new(spec);

        match self.open_from_search_dirs(spec.name) {
            Ok((handle, path)) => {
                info!("Loaded module {} from {}", spec.name, path.display());
                desc.status = ModuleStatus::Loaded;
                desc.handle = Some(handle);
                desc.path = Some(path);
                self.modules.push(desc);
                self.load_order.push(id);
                Ok(id)
            }
            Err(e) => {
                desc.status = ModuleStatus::LoadFailed;
                self.modules.push(desc);
                match spec.fatal_code() {
                    Some(code) => {
                        error!("Failed to load required module {}: {}", spec.name, e);
                        Err(LauncherError::RequiredModule {
                            module: spec.name,
                            code,
                            source: e,
                        })
                    }
                    None => {
                        warn!("Optional module {} unavailable, capability disabled: {}", spec.name, e);
                        Ok(id)
                    }
                }
            }
        }
    }

    /// Load a module set in order, stopping at the first required failure
    pub fn load_set(&mut self, specs: &[ModuleSpec]) -> Result<(), LauncherError> {
        for spec in specs {
            self.load(*spec)?;
        }
        let loaded = self.load_order.len();
        info!(
            "Module set ready via {} backend: {} of {} loaded",
            self.backend.name(),
            loaded,
            specs.len()
        );
        Ok(())
    }

    fn open_from_search_dirs(&self, name: &str) -> Result<(ModuleHandle, PathBuf), LoaderError> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(LoaderError::InvalidName(name.to_string()));
        }

        let file_name = module_file_name(name);
        let mut searched = Vec::with_capacity(self.search_dirs.len());
        let mut last_error = None;

        for dir in &self.search_dirs {
            let path = dir.join(&file_name);
            match self.backend.open(&path) {
                Ok(Some(handle)) => return Ok((handle, path)),
                Ok(None) => trace!("{} not present", path.display()),
                Err(e) => {
                    debug!("{}", e);
                    last_error = Some(e);
                }
            }
            searched.push(path);
        }

        Err(last_error.unwrap_or(LoaderError::NotFound {
            name: name.to_string(),
            searched,
        }))
    }

    /// Look up a module by name (case-insensitive)
    pub fn find(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .position(|m| m.name().eq_ignore_ascii_case(name))
            .map(ModuleId)
    }

    pub fn descriptor(&self, id: ModuleId) -> Option<&ModuleDescriptor> {
        self.modules.get(id.0)
    }

    /// Every module this loader has seen, in first-load order
    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter()
    }

    /// Check whether a module is currently loaded
    pub fn is_loaded(&self, name: &str) -> bool {
        self.find(name)
            .and_then(|id| self.descriptor(id))
            .is_some_and(ModuleDescriptor::is_loaded)
    }

    /// Resolve an export; `None` unless the module is loaded and exports it
    pub fn resolve(&self, id: ModuleId, selector: Selector) -> Option<EntryPoint> {
        let desc = self.descriptor(id)?;
        if desc.status != ModuleStatus::Loaded {
            trace!("Not resolving {}:{}, module {}", desc.name(), selector, desc.status);
            return None;
        }
        let entry = self.backend.symbol(desc.handle?, selector);
        match entry {
            Some(e) => trace!("Resolved {}:{} at {:p}", desc.name(), selector, e.as_ptr()),
            None => debug!("Unresolved symbol {}:{}", desc.name(), selector),
        }
        entry
    }

    /// Bind an export as a typed function pointer
    ///
    /// Unknown or unloaded modules yield an unresolved binding.
    ///
    /// # Safety
    ///
    /// `F` must match the real signature of the export.
    pub unsafe fn bind<F: Signature>(&self, module: &'static str, selector: Selector) -> Binding<'_, F> {
        let target = self
            .find(module)
            .and_then(|id| self.resolve(id, selector))
            .map(|entry| unsafe { F::from_entry(entry) });
        Binding::new(module, selector, target)
    }

    /// Release a module; a no-op unless it is loaded
    pub fn unload(&mut self, id: ModuleId) {
        let Some(desc) = self.modules.get_mut(id.0) else {
            return;
        };
        match desc.handle.take() {
            Some(handle) => {
                self.backend.close(handle);
                desc.status = ModuleStatus::Unloaded;
                desc.released = true;
                debug!("Unloaded module {}", desc.name());
            }
            None => trace!("Module {} has nothing to unload ({})", desc.name(), desc.status),
        }
    }

    /// Release every loaded module in reverse load order
    pub fn unload_all(&mut self) {
        let order: Vec<ModuleId> = self.load_order.iter().rev().copied().collect();
        for id in order {
            self.unload(id);
        }
    }

    /// Whether a module has already been released this run
    pub fn was_released(&self, id: ModuleId) -> bool {
        self.descriptor(id).is_some_and(|d| d.released)
    }
}

impl Drop for ModuleLoader {
    fn drop(&mut self) {
        self.unload_all();
    }
}
