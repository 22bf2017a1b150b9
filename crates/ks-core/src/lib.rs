//! Core types for the keystone launcher
//!
//! This crate provides the error taxonomy, the launch configuration snapshot
//! with its layered builder, command-line handling and logging setup shared
//! by the loader and integration crates.

pub mod builder;
pub mod cmdline;
pub mod config;
pub mod error;
pub mod logging;
pub mod settings;

pub use builder::LaunchConfigBuilder;
pub use cmdline::CommandLine;
pub use config::{
    CallbackHandle, CallbackSlot, GameMode, LaunchConfiguration, RequirementGatePolicy, VideoMode,
};
pub use error::{exit_code, ConfigError, LauncherError, LoaderError, Result};
pub use settings::{ConfigLayer, MemoryStore, SettingsStore, SystemStore};
