//! Launch configuration snapshot
//!
//! [`LaunchConfiguration`] is produced once by the
//! [`LaunchConfigBuilder`](crate::builder::LaunchConfigBuilder) and only
//! handed out by shared reference afterwards. The single exception to
//! immutability is the [`CallbackSlot`], which accepts exactly one write.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Current layout version of [`LaunchConfiguration`]
pub const CONFIG_VERSION: u32 = 1;

/// Renderer selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum VideoMode {
    #[default]
    Gdi = 0,
    Direct3D = 1,
    OpenGl = 2,
    Glide = 3,
    /// Let the graphics module pick
    Auto = 4,
}

impl VideoMode {
    /// Decode the numeric mode used by configuration tiers
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Gdi),
            1 => Some(Self::Direct3D),
            2 => Some(Self::OpenGl),
            3 => Some(Self::Glide),
            4 => Some(Self::Auto),
            _ => None,
        }
    }

    /// Numeric value handed to the graphics module
    pub fn raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gdi => write!(f, "GDI"),
            Self::Direct3D => write!(f, "Direct3D"),
            Self::OpenGl => write!(f, "OpenGL"),
            Self::Glide => write!(f, "Glide"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Game mode, which decides the optional module set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub enum GameMode {
    #[default]
    SinglePlayer,
    Multiplayer,
    /// Networked play through the online service
    BattleNet,
}

impl GameMode {
    /// Decode the numeric mode used by configuration tiers
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::SinglePlayer),
            1 => Some(Self::Multiplayer),
            2 => Some(Self::BattleNet),
            _ => None,
        }
    }

    /// Whether this mode talks to remote peers
    pub fn is_networked(self) -> bool {
        !matches!(self, Self::SinglePlayer)
    }
}

/// What the requirement-validation gate does when its entry point is
/// unresolved
///
/// Defaults to [`AssumePass`](Self::AssumePass). Whether the pass-through is a
/// deliberate degrade-gracefully rule or a placeholder for a check that was
/// never wired up is unknown, so it is kept as a visible setting
/// (`UnresolvedRequirementCheck = "pass" | "fail"`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum RequirementGatePolicy {
    #[default]
    AssumePass,
    Fail,
}

impl RequirementGatePolicy {
    /// Parse the configuration-file spelling
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pass" | "assume-pass" | "assumepass" => Some(Self::AssumePass),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }

    /// Gate result used in place of the missing check
    pub fn default_outcome(self) -> bool {
        matches!(self, Self::AssumePass)
    }
}

/// Opaque interface pointer published by a loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(usize);

impl CallbackHandle {
    /// Wrap a non-null interface pointer
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr as usize))
        }
    }

    /// Raw interface pointer
    pub fn as_ptr(self) -> *const c_void {
        self.0 as *const c_void
    }
}

/// Single-writer slot for the module callback interface
///
/// The first [`publish`](Self::publish) wins; any later publish is rejected
/// and handed back to the caller. Clones share one slot.
#[derive(Debug, Clone, Default)]
pub struct CallbackSlot(Arc<OnceCell<CallbackHandle>>);

impl CallbackSlot {
    /// Publish the callback interface
    pub fn publish(&self, handle: CallbackHandle) -> Result<(), CallbackHandle> {
        self.0.set(handle).map_err(|_| handle)?;
        tracing::debug!("Callback interface published at {:p}", handle.as_ptr());
        Ok(())
    }

    /// Published interface, if any
    pub fn get(&self) -> Option<CallbackHandle> {
        self.0.get().copied()
    }

    /// Check whether an interface was published
    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }
}

/// Immutable launch configuration snapshot
#[derive(Debug, Clone)]
pub struct LaunchConfiguration {
    /// Record layout version, see [`CONFIG_VERSION`]
    pub version: u32,
    /// Directory searched first for modules and the expansion marker
    pub install_path: PathBuf,
    pub video_mode: VideoMode,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Bits per pixel
    pub color_depth: u32,
    pub windowed: bool,
    pub no_sound: bool,
    pub no_music: bool,
    /// 0..=100
    pub sound_volume: u8,
    /// 0..=100
    pub music_volume: u8,
    pub game_mode: GameMode,
    /// Expansion content detected in the install directory
    pub expansion: bool,
    /// Go straight to character selection
    pub skip_menu: bool,
    /// Parameter forwarded to the menu phase
    pub menu_init_param: u32,
    /// Index into the renderer keyword table
    pub render_keyword: u32,
    pub requirement_gate: RequirementGatePolicy,
    /// Written at most once by a loaded module
    pub callback: CallbackSlot,
}

impl Default for LaunchConfiguration {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            install_path: PathBuf::from("."),
            video_mode: VideoMode::default(),
            screen_width: 800,
            screen_height: 600,
            color_depth: 32,
            windowed: false,
            no_sound: false,
            no_music: false,
            sound_volume: 100,
            music_volume: 100,
            game_mode: GameMode::default(),
            expansion: false,
            skip_menu: false,
            menu_init_param: 0,
            render_keyword: crate::cmdline::DEFAULT_RENDER_KEYWORD,
            requirement_gate: RequirementGatePolicy::default(),
            callback: CallbackSlot::default(),
        }
    }
}
