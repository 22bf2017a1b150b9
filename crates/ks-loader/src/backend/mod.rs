//! Module backends
//!
//! A backend knows how to open a module file, look up exports in it and
//! release it again. [`NativeBackend`] goes through the platform dynamic
//! loader; [`TableBackend`] serves export tables registered in-process.

mod native;
mod table;

pub use native::{NativeBackend, ORDINAL_SYMBOL_PREFIX};
pub use table::{ExportTable, TableBackend};

use crate::symbol::{EntryPoint, Selector};
use ks_core::LoaderError;
use std::path::Path;

/// Backend specific module handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub(crate) usize);

impl ModuleHandle {
    pub fn raw(self) -> usize {
        self.0
    }
}

/// Platform abstraction for opening modules and resolving exports
pub trait ModuleBackend {
    /// Backend name, used in traces
    fn name(&self) -> &'static str;

    /// Open the module file at `path`
    ///
    /// Returns `Ok(None)` when nothing exists at `path` and an error when the
    /// file exists but cannot be loaded.
    fn open(&self, path: &Path) -> Result<Option<ModuleHandle>, LoaderError>;

    /// Look up an export; never fails, absence is `None`
    fn symbol(&self, handle: ModuleHandle, selector: Selector) -> Option<EntryPoint>;

    /// Release a handle returned by [`open`](Self::open)
    fn close(&self, handle: ModuleHandle);
}

impl<B: ModuleBackend + ?Sized> ModuleBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn open(&self, path: &Path) -> Result<Option<ModuleHandle>, LoaderError> {
        (**self).open(path)
    }

    fn symbol(&self, handle: ModuleHandle, selector: Selector) -> Option<EntryPoint> {
        (**self).symbol(handle, selector)
    }

    fn close(&self, handle: ModuleHandle) {
        (**self).close(handle)
    }
}
