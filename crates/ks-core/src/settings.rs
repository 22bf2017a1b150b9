//! Configuration tiers
//!
//! Both the local configuration file and the system-wide store deserialize
//! into a [`ConfigLayer`], a record where every field is optional. Layers are
//! stacked by the builder; an absent field falls through to the next tier.

use crate::config::{GameMode, RequirementGatePolicy, VideoMode};
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the system-wide store location
pub const SYSTEM_CONFIG_ENV: &str = "KEYSTONE_SYSTEM_CONFIG";

/// Boolean flag as written in a tier, either `true`/`false` or `0`/`1`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Int(i64),
}

impl FlagValue {
    fn as_bool(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
        }
    }
}

/// One configuration tier with every field optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub install_path: Option<PathBuf>,
    pub video_mode: Option<VideoMode>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub color_depth: Option<u32>,
    pub windowed: Option<bool>,
    pub no_sound: Option<bool>,
    pub no_music: Option<bool>,
    pub sound_volume: Option<u8>,
    pub music_volume: Option<u8>,
    pub game_mode: Option<GameMode>,
    pub expansion: Option<bool>,
    pub skip_menu: Option<bool>,
    pub requirement_gate: Option<RequirementGatePolicy>,
}

impl ConfigLayer {
    /// Parse a tier from TOML text
    ///
    /// Unknown keys are ignored. Each known key is converted on its own; a
    /// value of the wrong type or out of range is dropped with a warning so
    /// the rest of the tier still applies. Only malformed TOML fails the tier.
    pub fn parse_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let table = text.parse::<toml::Table>().map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::from_table(&table, origin))
    }

    fn from_table(table: &toml::Table, origin: &Path) -> Self {
        let flag = |key: &'static str| field::<FlagValue>(table, key, origin).map(FlagValue::as_bool);
        let volume = |key: &'static str| field::<i64>(table, key, origin).map(clamp_volume);

        let mut layer = Self {
            install_path: field(table, "InstallPath", origin),
            no_sound: flag("NoSound"),
            no_music: flag("NoMusic"),
            expansion: flag("Expansion"),
            windowed: flag("Windowed"),
            sound_volume: volume("SoundVolume"),
            music_volume: volume("MusicVolume"),
            ..Self::default()
        };

        if let Some(video) = field::<String>(table, "VideoConfig", origin) {
            layer.apply_video_config(&video, origin);
        }

        if let Some(mode) = field::<u32>(table, "GameMode", origin) {
            layer.game_mode = GameMode::from_raw(mode);
            if layer.game_mode.is_none() {
                warn_invalid(origin, "GameMode", &mode.to_string());
            }
        }

        if let Some(policy) = field::<String>(table, "UnresolvedRequirementCheck", origin) {
            layer.requirement_gate = RequirementGatePolicy::parse(&policy);
            if layer.requirement_gate.is_none() {
                warn_invalid(origin, "UnresolvedRequirementCheck", &policy);
            }
        }

        layer
    }

    /// Read the "WIDTH HEIGHT DEPTH MODE" quadruple
    ///
    /// Parsing stops at the first token that is not a number; the fields read
    /// up to that point are kept.
    fn apply_video_config(&mut self, value: &str, origin: &Path) {
        let mut fields = value.split_whitespace().map(str::parse::<u32>);
        let mut next = || fields.next().and_then(|f| f.ok());

        let Some(width) = next() else {
            warn_invalid(origin, "VideoConfig", value);
            return;
        };
        self.screen_width = Some(width);
        self.screen_height = next();
        if self.screen_height.is_none() {
            return;
        }
        self.color_depth = next();
        if self.color_depth.is_none() {
            return;
        }
        if let Some(mode) = next() {
            self.video_mode = VideoMode::from_raw(mode);
            if self.video_mode.is_none() {
                warn_invalid(origin, "VideoConfig", value);
            }
        }
    }

    /// Stack `self` on top of `lower`; fields set here win
    pub fn over(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            install_path: self.install_path.or(lower.install_path),
            video_mode: self.video_mode.or(lower.video_mode),
            screen_width: self.screen_width.or(lower.screen_width),
            screen_height: self.screen_height.or(lower.screen_height),
            color_depth: self.color_depth.or(lower.color_depth),
            windowed: self.windowed.or(lower.windowed),
            no_sound: self.no_sound.or(lower.no_sound),
            no_music: self.no_music.or(lower.no_music),
            sound_volume: self.sound_volume.or(lower.sound_volume),
            music_volume: self.music_volume.or(lower.music_volume),
            game_mode: self.game_mode.or(lower.game_mode),
            expansion: self.expansion.or(lower.expansion),
            skip_menu: self.skip_menu.or(lower.skip_menu),
            requirement_gate: self.requirement_gate.or(lower.requirement_gate),
        }
    }

    /// Check whether no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Convert one key of a tier, warning when its value has the wrong type
fn field<T: DeserializeOwned>(table: &toml::Table, key: &'static str, origin: &Path) -> Option<T> {
    let value = table.get(key)?;
    match value.clone().try_into::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn_invalid(origin, key, &value.to_string());
            None
        }
    }
}

fn clamp_volume(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

fn warn_invalid(origin: &Path, key: &'static str, value: &str) {
    let err = ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    };
    tracing::warn!("{} in {:?}, ignoring", err, origin);
}

/// Read a tier file
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_layer_file(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    ConfigLayer::parse_toml(&text, path).map(Some)
}

/// Source of the system-wide configuration tier
pub trait SettingsStore {
    /// Human readable location, used in traces
    fn describe(&self) -> String;

    /// Load the tier; an absent store yields an empty layer
    fn load(&self) -> Result<ConfigLayer, ConfigError>;
}

/// System-wide store backed by a TOML file in the user configuration
/// directory
#[derive(Debug, Clone)]
pub struct SystemStore {
    path: Option<PathBuf>,
}

impl SystemStore {
    /// Store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Store location from the environment, falling back to
    /// `<config dir>/keystone/settings.toml`
    pub fn from_env(env: &HashMap<String, String>) -> Self {
        let path = env
            .get(SYSTEM_CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("keystone").join("settings.toml")));
        Self { path }
    }

    /// Path of the backing file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl SettingsStore for SystemStore {
    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("system store {}", path.display()),
            None => "system store (no configuration directory)".to_string(),
        }
    }

    fn load(&self) -> Result<ConfigLayer, ConfigError> {
        match &self.path {
            Some(path) => Ok(read_layer_file(path)?.unwrap_or_default()),
            None => Ok(ConfigLayer::default()),
        }
    }
}

/// In-memory store for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    layer: ConfigLayer,
}

impl MemoryStore {
    /// Store holding a ready layer
    pub fn new(layer: ConfigLayer) -> Self {
        Self { layer }
    }

    /// Store parsed from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let layer = ConfigLayer::parse_toml(text, Path::new("<memory>"))?;
        Ok(Self { layer })
    }
}

impl SettingsStore for MemoryStore {
    fn describe(&self) -> String {
        "in-memory store".to_string()
    }

    fn load(&self) -> Result<ConfigLayer, ConfigError> {
        Ok(self.layer.clone())
    }
}
