//! In-process export table backend

use super::{ModuleBackend, ModuleHandle};
use crate::module::module_file_name;
use crate::symbol::{EntryPoint, Selector, Signature};
use ks_core::LoaderError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Exports of one module (selector -> entry point)
#[derive(Debug, Clone)]
pub struct ExportTable {
    module: String,
    ordinals: HashMap<u16, EntryPoint>,
    names: HashMap<&'static str, EntryPoint>,
    /// Only openable from this directory when set
    location: Option<PathBuf>,
    /// Opening fails as if the file were corrupt
    broken: bool,
}

impl ExportTable {
    /// Create an empty export table for a module
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ordinals: HashMap::new(),
            names: HashMap::new(),
            location: None,
            broken: false,
        }
    }

    /// Restrict the table to a single search directory
    pub fn located_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.location = Some(dir.into());
        self
    }

    /// Make every open attempt fail
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Export a function by ordinal
    pub fn ordinal<F: Signature>(mut self, ordinal: u16, func: F) -> Self {
        self.ordinals.insert(ordinal, func.into_entry());
        self
    }

    /// Export a function by name
    pub fn name<F: Signature>(mut self, name: &'static str, func: F) -> Self {
        self.names.insert(name, func.into_entry());
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    fn lookup(&self, selector: Selector) -> Option<EntryPoint> {
        match selector {
            Selector::Ordinal(n) => self.ordinals.get(&n).copied(),
            Selector::Name(name) => self.names.get(name).copied(),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let file_matches = path
            .file_name()
            .and_then(|f| f.to_str())
            .is_some_and(|f| f.eq_ignore_ascii_case(&module_file_name(&self.module)));
        let dir_matches = match &self.location {
            Some(dir) => path.parent() == Some(dir.as_path()),
            None => true,
        };
        file_matches && dir_matches
    }
}

#[derive(Default)]
struct TableState {
    tables: Vec<ExportTable>,
    open_counts: Vec<u32>,
    close_counts: Vec<u32>,
    close_log: Vec<String>,
}

/// Backend resolving modules against registered [`ExportTable`]s
///
/// Clones share the same registry, so a caller can keep a clone to inspect
/// open/close activity after handing the backend to a loader.
#[derive(Clone, Default)]
pub struct TableBackend {
    state: Arc<RwLock<TableState>>,
}

impl TableBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an export table
    pub fn register(&self, table: ExportTable) {
        let mut state = self.state.write();
        tracing::trace!("Registered export table for {}", table.module);
        state.tables.push(table);
        state.open_counts.push(0);
        state.close_counts.push(0);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(self, table: ExportTable) -> Self {
        self.register(table);
        self
    }

    fn index_of(&self, module: &str) -> Option<usize> {
        self.state
            .read()
            .tables
            .iter()
            .position(|t| t.module.eq_ignore_ascii_case(module))
    }

    /// Number of successful opens of a module
    pub fn open_count(&self, module: &str) -> u32 {
        self.index_of(module)
            .map(|i| self.state.read().open_counts[i])
            .unwrap_or(0)
    }

    /// Number of closes of a module
    pub fn close_count(&self, module: &str) -> u32 {
        self.index_of(module)
            .map(|i| self.state.read().close_counts[i])
            .unwrap_or(0)
    }

    /// Module names in the order they were closed
    pub fn close_log(&self) -> Vec<String> {
        self.state.read().close_log.clone()
    }
}

impl ModuleBackend for TableBackend {
    fn name(&self) -> &'static str {
        "table"
    }

    fn open(&self, path: &Path) -> Result<Option<ModuleHandle>, LoaderError> {
        let mut state = self.state.write();
        let Some(index) = state.tables.iter().position(|t| t.matches(path)) else {
            return Ok(None);
        };
        if state.tables[index].broken {
            return Err(LoaderError::Open {
                path: path.to_path_buf(),
                reason: "export table marked broken".to_string(),
            });
        }
        state.open_counts[index] += 1;
        Ok(Some(ModuleHandle(index + 1)))
    }

    fn symbol(&self, handle: ModuleHandle, selector: Selector) -> Option<EntryPoint> {
        let state = self.state.read();
        let table = handle.0.checked_sub(1).and_then(|i| state.tables.get(i))?;
        table.lookup(selector)
    }

    fn close(&self, handle: ModuleHandle) {
        let mut state = self.state.write();
        let Some(index) = handle.0.checked_sub(1).filter(|i| *i < state.tables.len()) else {
            return;
        };
        state.close_counts[index] += 1;
        let module = state.tables[index].module.clone();
        state.close_log.push(module);
    }
}
