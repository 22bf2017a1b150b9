//! Capability module loader
//!
//! Loads the fixed module set for a game mode from the install directory
//! (falling back to the working directory), tracks every module through a
//! [`ModuleDescriptor`], and resolves entry points by ordinal or name into
//! typed [`Binding`]s that are either resolved or explicitly unresolved.

pub mod backend;
pub mod loader;
pub mod module;
pub mod symbol;

pub use backend::{ExportTable, ModuleBackend, ModuleHandle, NativeBackend, TableBackend};
pub use loader::{ModuleId, ModuleLoader};
pub use module::{
    module_file_name, module_set, ModuleDescriptor, ModuleSpec, ModuleStatus, Requirement,
};
pub use symbol::{Binding, EntryPoint, Selector, Signature};
