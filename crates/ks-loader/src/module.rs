//! Module set and module descriptors

use crate::backend::ModuleHandle;
use ks_core::GameMode;
use std::collections::HashSet;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fmt;
use std::path::{Path, PathBuf};

/// Whether a module's absence ends the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Failing to load terminates the process with `code`
    Required { code: i32 },
    /// Failing to load disables the capability for the rest of the run
    Optional,
}

/// Static description of one capability module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: &'static str,
    pub requirement: Requirement,
}

impl ModuleSpec {
    pub const fn required(name: &'static str, code: i32) -> Self {
        Self {
            name,
            requirement: Requirement::Required { code },
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            requirement: Requirement::Optional,
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self.requirement, Requirement::Required { .. })
    }

    /// Exit code for a failed load, `None` for optional modules
    pub fn fatal_code(&self) -> Option<i32> {
        match self.requirement {
            Requirement::Required { code } => Some(code),
            Requirement::Optional => None,
        }
    }
}

/// Modules loaded in every game mode, in load order
pub static REQUIRED_MODULES: [ModuleSpec; 9] = [
    ModuleSpec::required("Fog", 0x20),
    ModuleSpec::required("D2Gfx", 0x21),
    ModuleSpec::required("D2Sound", 0x22),
    ModuleSpec::required("D2Game", 0x23),
    ModuleSpec::required("D2Net", 0x24),
    ModuleSpec::required("D2Win", 0x25),
    ModuleSpec::required("D2Lang", 0x26),
    ModuleSpec::required("D2Cmp", 0x27),
    ModuleSpec::required("Storm", 0x28),
];

/// Local game server, single player only
pub const SERVER_MODULE: ModuleSpec = ModuleSpec::optional("D2Server");
/// Client front end, networked modes
pub const CLIENT_MODULE: ModuleSpec = ModuleSpec::optional("D2Client");
/// Online service support
pub const MULTI_MODULE: ModuleSpec = ModuleSpec::optional("D2Multi");

/// Full module set for a game mode, in load order
pub fn module_set(mode: GameMode) -> Vec<ModuleSpec> {
    let mut set = REQUIRED_MODULES.to_vec();
    match mode {
        GameMode::SinglePlayer => set.push(SERVER_MODULE),
        GameMode::Multiplayer => set.push(CLIENT_MODULE),
        GameMode::BattleNet => {
            set.push(CLIENT_MODULE);
            set.push(MULTI_MODULE);
        }
    }
    set
}

static OPTIONAL_MODULES: [ModuleSpec; 3] = [SERVER_MODULE, CLIENT_MODULE, MULTI_MODULE];

/// Every module name any game mode may load
pub fn known_modules() -> impl Iterator<Item = &'static str> {
    REQUIRED_MODULES
        .iter()
        .chain(OPTIONAL_MODULES.iter())
        .map(|spec| spec.name)
}

/// Check the module table for duplicate names or exit codes
pub fn validate_module_table() -> Result<(), String> {
    let mut names = HashSet::new();
    for name in known_modules() {
        if !names.insert(name.to_ascii_lowercase()) {
            return Err(format!("duplicate module name {}", name));
        }
    }

    let mut codes = HashSet::new();
    for spec in REQUIRED_MODULES.iter() {
        if let Some(code) = spec.fatal_code() {
            if code == 0 || !codes.insert(code) {
                return Err(format!("module {} has unusable exit code {:#x}", spec.name, code));
            }
        }
    }
    Ok(())
}

/// Platform file name of a module
pub fn module_file_name(name: &str) -> String {
    format!("{}{}{}", DLL_PREFIX, name, DLL_SUFFIX)
}

/// Module load status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Unloaded,
    Loaded,
    LoadFailed,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loaded => write!(f, "loaded"),
            Self::LoadFailed => write!(f, "load failed"),
        }
    }
}

/// Runtime record of one module
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub(crate) spec: ModuleSpec,
    pub(crate) status: ModuleStatus,
    pub(crate) handle: Option<ModuleHandle>,
    pub(crate) path: Option<PathBuf>,
    /// Set once the module has gone through Loaded
    pub(crate) released: bool,
}

impl ModuleDescriptor {
    pub(crate) fn new(spec: ModuleSpec) -> Self {
        Self {
            spec,
            status: ModuleStatus::Unloaded,
            handle: None,
            path: None,
            released: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn is_required(&self) -> bool {
        self.spec.is_required()
    }

    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    pub fn is_loaded(&self) -> bool {
        self.status == ModuleStatus::Loaded
    }

    /// File the module was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
