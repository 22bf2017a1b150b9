//! Launch configuration builder
//!
//! Precedence, highest first: command line, local configuration file,
//! system-wide store, hard-coded defaults. A tier that is missing or fails to
//! read contributes nothing.

use crate::cmdline::{extract_render_keyword, CommandLine, WINDOWED_RESOLUTION};
use crate::config::LaunchConfiguration;
use crate::settings::{read_layer_file, ConfigLayer, SettingsStore, SystemStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Local configuration file name, looked up next to the executable
pub const LOCAL_CONFIG_FILE: &str = "keystone.toml";

/// Environment variable overriding the local configuration file
pub const LOCAL_CONFIG_ENV: &str = "KEYSTONE_CONFIG";

/// Marker file whose presence in the install directory signals expansion
/// content
pub const EXPANSION_MARKER: &str = "d2exp.mpq";

/// Builds the [`LaunchConfiguration`] snapshot
pub struct LaunchConfigBuilder {
    exe_dir: PathBuf,
    local_file: Option<PathBuf>,
    system_store: Option<Box<dyn SettingsStore>>,
}

impl LaunchConfigBuilder {
    /// Create a builder for an executable living in `exe_dir`
    pub fn new(exe_dir: impl Into<PathBuf>) -> Self {
        Self {
            exe_dir: exe_dir.into(),
            local_file: None,
            system_store: None,
        }
    }

    /// Use an explicit local configuration file
    pub fn local_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_file = Some(path.into());
        self
    }

    /// Use an explicit system-wide store
    pub fn system_store(mut self, store: impl SettingsStore + 'static) -> Self {
        self.system_store = Some(Box::new(store));
        self
    }

    /// Merge every tier into the final snapshot
    pub fn build(&self, argv: &[String], env: &HashMap<String, String>) -> LaunchConfiguration {
        self.build_parsed(&CommandLine::parse(argv), argv, env)
    }

    /// Merge every tier, reusing a command line parsed earlier from `argv`
    pub fn build_parsed(
        &self,
        cmdline: &CommandLine,
        argv: &[String],
        env: &HashMap<String, String>,
    ) -> LaunchConfiguration {
        if !cmdline.unrecognized.is_empty() {
            debug!("Ignoring unrecognized arguments: {:?}", cmdline.unrecognized);
        }

        let local_path = self
            .local_file
            .clone()
            .or_else(|| env.get(LOCAL_CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| self.exe_dir.join(LOCAL_CONFIG_FILE));
        let local = self.load_local(&local_path);

        let system = match &self.system_store {
            Some(store) => load_store(store.as_ref()),
            None => load_store(&SystemStore::from_env(env)),
        };

        let merged = cmdline.to_layer().over(local).over(system);
        let command_tail = argv.iter().skip(1).cloned().collect::<Vec<_>>().join(" ");
        let config = self.resolve(merged, extract_render_keyword(&command_tail));

        info!(
            "Launch configuration: {}x{}x{} {} windowed={} mode={:?} expansion={} skip_menu={} keyword={}",
            config.screen_width,
            config.screen_height,
            config.color_depth,
            config.video_mode,
            config.windowed,
            config.game_mode,
            config.expansion,
            config.skip_menu,
            config.render_keyword
        );
        config
    }

    fn load_local(&self, path: &Path) -> ConfigLayer {
        match read_layer_file(path) {
            Ok(Some(layer)) => {
                info!("Loaded local configuration from {}", path.display());
                layer
            }
            Ok(None) => {
                debug!("No local configuration at {}", path.display());
                ConfigLayer::default()
            }
            Err(e) => {
                warn!("Local configuration unusable, using lower tiers: {}", e);
                ConfigLayer::default()
            }
        }
    }

    /// Fill every field from the merged layer or the hard-coded default
    fn resolve(&self, merged: ConfigLayer, render_keyword: u32) -> LaunchConfiguration {
        let defaults = LaunchConfiguration::default();

        let screen_width = merged.screen_width.unwrap_or(defaults.screen_width);
        let screen_height = merged.screen_height.unwrap_or(defaults.screen_height);
        let windowed = merged
            .windowed
            .unwrap_or((screen_width, screen_height) == WINDOWED_RESOLUTION);

        let install_path = merged.install_path.unwrap_or_else(|| self.exe_dir.clone());
        let expansion = detect_expansion(&install_path);
        if let Some(configured) = merged.expansion {
            if configured != expansion {
                warn!(
                    "Configured expansion flag ({}) does not match installed content ({}), using detection",
                    configured, expansion
                );
            }
        }

        LaunchConfiguration {
            install_path,
            video_mode: merged.video_mode.unwrap_or(defaults.video_mode),
            screen_width,
            screen_height,
            color_depth: merged.color_depth.unwrap_or(defaults.color_depth),
            windowed,
            no_sound: merged.no_sound.unwrap_or(defaults.no_sound),
            no_music: merged.no_music.unwrap_or(defaults.no_music),
            sound_volume: merged.sound_volume.unwrap_or(defaults.sound_volume),
            music_volume: merged.music_volume.unwrap_or(defaults.music_volume),
            game_mode: merged.game_mode.unwrap_or(defaults.game_mode),
            expansion,
            skip_menu: merged.skip_menu.unwrap_or(defaults.skip_menu),
            render_keyword,
            requirement_gate: merged.requirement_gate.unwrap_or(defaults.requirement_gate),
            ..defaults
        }
    }
}

fn load_store(store: &dyn SettingsStore) -> ConfigLayer {
    match store.load() {
        Ok(layer) => {
            if !layer.is_empty() {
                info!("Loaded {}", store.describe());
            }
            layer
        }
        Err(e) => {
            warn!("{} unusable, using defaults: {}", store.describe(), e);
            ConfigLayer::default()
        }
    }
}

/// Look for the expansion marker in the install directory
pub fn detect_expansion(install_path: &Path) -> bool {
    let found = install_path.join(EXPANSION_MARKER).is_file();
    debug!(
        "Expansion marker {} in {}: {}",
        EXPANSION_MARKER,
        install_path.display(),
        if found { "found" } else { "absent" }
    );
    found
}
