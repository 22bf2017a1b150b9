//! Error types for the keystone launcher
//!
//! Every fatal error carries the process exit code that is reported to the
//! outside world. Those codes are part of the external contract and must not
//! be renumbered.

use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes that are not tied to a bootstrap step or a module
pub mod exit_code {
    /// Normal termination through the Exit state or a close request
    pub const SUCCESS: i32 = 0;
    /// System requirement validation rejected the machine
    pub const REQUIREMENTS_NOT_MET: i32 = 0x30;
    /// No usable default screen mode
    pub const NO_SCREEN_MODE: i32 = 0x31;
    /// Renderer initialization failed after the graphics subsystem came up
    pub const RENDERER_INIT_FAILED: i32 = 0x32;
}

/// Main error type for the launcher
///
/// Only the variants listed here ever cross a component boundary. Optional
/// module failures, unresolved symbols and configuration fallbacks are
/// absorbed where they happen and never become a `LauncherError`.
#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Bootstrap step {index} ({step}) failed: {reason}")]
    Bootstrap {
        index: usize,
        step: &'static str,
        code: i32,
        reason: String,
    },

    #[error("Required module {module} could not be loaded: {source}")]
    RequiredModule {
        module: &'static str,
        code: i32,
        #[source]
        source: LoaderError,
    },

    #[error("System requirements validation failed")]
    RequirementsNotMet,

    #[error("No default screen mode available")]
    NoScreenMode,

    #[error("Renderer initialization failed")]
    RendererInit,
}

impl LauncherError {
    /// Exit code the process terminates with for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Bootstrap { code, .. } => *code,
            Self::RequiredModule { code, .. } => *code,
            Self::RequirementsNotMet => exit_code::REQUIREMENTS_NOT_MET,
            Self::NoScreenMode => exit_code::NO_SCREEN_MODE,
            Self::RendererInit => exit_code::RENDERER_INIT_FAILED,
        }
    }

    /// Title used for the blocking fatal notification
    pub fn title(&self) -> &'static str {
        match self {
            Self::Bootstrap { .. } => "Startup Error",
            Self::RequiredModule { .. } => "Module Loading Error",
            _ => "Critical Error",
        }
    }
}

/// Module loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("{name} not found (searched {searched:?})")]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to open {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("invalid module name: {0:?}")]
    InvalidName(String),

    #[error("module {0} is not loaded")]
    NotLoaded(String),
}

/// Configuration tier errors
///
/// These never escape the configuration builder; a tier that fails to read
/// is treated as empty.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LauncherError>;
