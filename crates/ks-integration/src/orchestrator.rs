//! Subsystem orchestrator
//!
//! Sequences capability phases in a fixed order and records which ones
//! actually came up in [`PhaseFlags`]. Every teardown step checks its flag,
//! so shutdown is safe after a partial or failed initialization and running
//! it twice is harmless.

use crate::engine::{AuxStage, EngineApi};
use bitflags::bitflags;
use ks_core::cmdline::RENDER_KEYWORDS;
use ks_core::{LaunchConfiguration, LauncherError, Result, VideoMode};
use tracing::{debug, info, warn};

bitflags! {
    /// Phases that completed initialization
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PhaseFlags: u32 {
        const AUDIO       = 0x01;
        const AUXILIARY   = 0x02;
        const GRAPHICS    = 0x04;
        const RENDERER    = 0x08;
        const PERIPHERALS = 0x10;
        const MENU        = 0x20;
    }
}

/// Drives initialization and teardown through an [`EngineApi`]
pub struct SubsystemOrchestrator<'a> {
    api: &'a dyn EngineApi,
    flags: PhaseFlags,
}

impl<'a> SubsystemOrchestrator<'a> {
    pub fn new(api: &'a dyn EngineApi) -> Self {
        Self {
            api,
            flags: PhaseFlags::empty(),
        }
    }

    pub fn api(&self) -> &'a dyn EngineApi {
        self.api
    }

    /// Phases currently initialized
    pub fn flags(&self) -> PhaseFlags {
        self.flags
    }

    /// Run every initialization phase in order
    ///
    /// On error the flags still describe what was brought up, and
    /// [`shutdown`](Self::shutdown) releases exactly that.
    pub fn initialize(&mut self, config: &LaunchConfiguration) -> Result<()> {
        info!("Initializing subsystems");

        // Phase 1: audio
        self.api.init_audio();
        self.flags |= PhaseFlags::AUDIO;

        // Phase 2: auxiliary engine
        for stage in AuxStage::ALL {
            self.api.init_aux(stage);
        }
        self.flags |= PhaseFlags::AUXILIARY;

        // Phase 3: requirement gates
        if !self.api.validate_requirements() {
            warn!("System requirements validation failed");
            return Err(LauncherError::RequirementsNotMet);
        }
        if !self.api.default_screen_mode() {
            warn!("No default screen mode");
            return Err(LauncherError::NoScreenMode);
        }

        // Phase 4: graphics and renderer
        debug!(
            "Video mode {} ({}), windowed {}",
            config.video_mode,
            config.video_mode.raw(),
            config.windowed
        );
        if self.api.init_graphics(config.video_mode, config.windowed) {
            self.flags |= PhaseFlags::GRAPHICS;
            let keyword = usize::try_from(config.render_keyword)
                .ok()
                .and_then(|i| RENDER_KEYWORDS.get(i))
                .copied()
                .unwrap_or("?");
            info!("Renderer keyword {} ({})", config.render_keyword, keyword);
            if !self.api.init_renderer(config.windowed, config.render_keyword) {
                warn!("Renderer initialization failed, shutting graphics down");
                self.api.shutdown_graphics();
                self.flags.remove(PhaseFlags::GRAPHICS);
                return Err(LauncherError::RendererInit);
            }
            self.flags |= PhaseFlags::RENDERER;
        } else {
            warn!("Graphics subsystem unavailable, continuing without it");
        }

        // Phase 5: peripheral tuning
        if self.flags.contains(PhaseFlags::GRAPHICS) && config.video_mode >= VideoMode::Auto {
            self.api.set_framerate_lock(true);
        }
        if !config.no_sound {
            self.api.enable_sound();
        }
        if config.video_mode.raw() > 0 {
            self.api.set_fps_display(config.video_mode.raw() as i32);
        }
        self.api.apply_gamma();
        self.api.enable_wide_aspect();
        self.flags |= PhaseFlags::PERIPHERALS;

        // Phase 6: menu
        if config.skip_menu {
            debug!("Menu initialization skipped");
        } else {
            self.init_menu(config);
        }

        info!("Subsystems initialized: {:?}", self.flags);
        Ok(())
    }

    /// Bring the menu up unless it already is
    pub fn init_menu(&mut self, config: &LaunchConfiguration) {
        if self.flags.contains(PhaseFlags::MENU) {
            return;
        }
        debug!("Menu init (param {})", config.menu_init_param);
        self.api.init_menu();
        self.flags |= PhaseFlags::MENU;
    }

    /// Release menu resources if they are held
    pub fn teardown_menu(&mut self) {
        if self.flags.contains(PhaseFlags::MENU) {
            self.api.cleanup_menu();
            self.flags.remove(PhaseFlags::MENU);
            debug!("Menu torn down");
        }
    }

    /// Pre-teardown step for graphics, only when graphics are up
    pub fn prepare_graphics_shutdown(&self) {
        if self.flags.contains(PhaseFlags::GRAPHICS) {
            self.api.prepare_graphics_shutdown();
        }
    }

    /// Full graphics teardown, only when graphics are up
    pub fn shutdown_graphics(&mut self) {
        if self.flags.contains(PhaseFlags::GRAPHICS) {
            self.api.prepare_graphics_shutdown();
            self.api.shutdown_graphics();
            self.flags.remove(PhaseFlags::GRAPHICS | PhaseFlags::RENDERER);
            debug!("Graphics shut down");
        }
    }

    /// Tear down every initialized phase in reverse order
    pub fn shutdown(&mut self) {
        if self.flags.is_empty() {
            debug!("Nothing to shut down");
            return;
        }
        info!("Shutting down subsystems: {:?}", self.flags);

        self.teardown_menu();
        self.flags.remove(PhaseFlags::PERIPHERALS);
        self.shutdown_graphics();
        if self.flags.contains(PhaseFlags::AUXILIARY) {
            for stage in AuxStage::ALL {
                self.api.shutdown_aux(stage);
            }
            self.flags.remove(PhaseFlags::AUXILIARY);
        }
        self.flags.remove(PhaseFlags::AUDIO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    #[test]
    fn test_phase_order() {
        let api = Recorder::default();
        let config = LaunchConfiguration {
            video_mode: VideoMode::Auto,
            ..LaunchConfiguration::default()
        };
        let mut orch = SubsystemOrchestrator::new(&api);
        orch.initialize(&config).unwrap();

        assert_eq!(
            api.calls(),
            vec![
                "init_audio",
                "init_aux First",
                "init_aux Second",
                "init_aux Third",
                "validate_requirements",
                "default_screen_mode",
                "init_graphics",
                "init_renderer",
                "set_framerate_lock true",
                "enable_sound",
                "set_fps_display 4",
                "apply_gamma",
                "enable_wide_aspect",
                "init_menu",
            ]
        );
        assert_eq!(orch.flags(), PhaseFlags::all());
        assert_eq!(api.render_keyword.get(), Some(4));
    }

    #[test]
    fn test_render_keyword_reaches_renderer() {
        let api = Recorder::default();
        let config = LaunchConfiguration {
            render_keyword: 2,
            ..LaunchConfiguration::default()
        };
        let mut orch = SubsystemOrchestrator::new(&api);
        orch.initialize(&config).unwrap();
        assert_eq!(api.render_keyword.get(), Some(2));
    }

    #[test]
    fn test_peripherals_follow_config() {
        let api = Recorder::default();
        let config = LaunchConfiguration {
            video_mode: VideoMode::Gdi,
            no_sound: true,
            skip_menu: true,
            ..LaunchConfiguration::default()
        };
        let mut orch = SubsystemOrchestrator::new(&api);
        orch.initialize(&config).unwrap();

        assert_eq!(api.count("set_framerate_lock true"), 0);
        assert_eq!(api.count("enable_sound"), 0);
        assert_eq!(api.count("set_fps_display 0"), 0);
        assert_eq!(api.count("init_menu"), 0);
        assert!(!orch.flags().contains(PhaseFlags::MENU));
    }

    #[test]
    fn test_requirement_gate_aborts() {
        let api = Recorder {
            fail_requirements: true,
            ..Recorder::default()
        };
        let mut orch = SubsystemOrchestrator::new(&api);
        let err = orch.initialize(&LaunchConfiguration::default()).unwrap_err();

        assert_eq!(err.exit_code(), 0x30);
        assert_eq!(api.count("init_graphics"), 0);
        assert_eq!(orch.flags(), PhaseFlags::AUDIO | PhaseFlags::AUXILIARY);

        orch.shutdown();
        assert_eq!(api.count("shutdown_aux First"), 1);
        assert_eq!(api.count("shutdown_graphics"), 0);
        assert!(orch.flags().is_empty());
    }

    #[test]
    fn test_screen_mode_gate_aborts() {
        let api = Recorder {
            fail_screen_mode: true,
            ..Recorder::default()
        };
        let mut orch = SubsystemOrchestrator::new(&api);
        let err = orch.initialize(&LaunchConfiguration::default()).unwrap_err();
        assert_eq!(err.exit_code(), 0x31);
    }

    #[test]
    fn test_renderer_failure_compensates() {
        let api = Recorder {
            fail_renderer: true,
            ..Recorder::default()
        };
        let mut orch = SubsystemOrchestrator::new(&api);
        let err = orch.initialize(&LaunchConfiguration::default()).unwrap_err();

        assert_eq!(err.exit_code(), 0x32);
        assert_eq!(api.count("shutdown_graphics"), 1);
        assert!(!orch.flags().contains(PhaseFlags::GRAPHICS));

        orch.shutdown();
        assert_eq!(api.count("shutdown_graphics"), 1);
    }

    #[test]
    fn test_graphics_failure_continues() {
        let api = Recorder {
            fail_graphics: true,
            ..Recorder::default()
        };
        let config = LaunchConfiguration {
            video_mode: VideoMode::Auto,
            ..LaunchConfiguration::default()
        };
        let mut orch = SubsystemOrchestrator::new(&api);
        orch.initialize(&config).unwrap();

        assert_eq!(api.count("init_renderer"), 0);
        assert_eq!(api.count("set_framerate_lock true"), 0);
        assert!(orch.flags().contains(PhaseFlags::MENU));
    }

    #[test]
    fn test_shutdown_mirror_and_idempotent() {
        let api = Recorder::default();
        let mut orch = SubsystemOrchestrator::new(&api);
        orch.initialize(&LaunchConfiguration::default()).unwrap();
        let before = api.calls().len();

        orch.shutdown();
        orch.shutdown();

        assert_eq!(
            api.calls()[before..].to_vec(),
            vec![
                "cleanup_menu",
                "prepare_graphics_shutdown",
                "shutdown_graphics",
                "shutdown_aux First",
                "shutdown_aux Second",
                "shutdown_aux Third",
            ]
        );
        assert!(orch.flags().is_empty());
    }

    #[test]
    fn test_shutdown_without_init() {
        let api = Recorder::default();
        let mut orch = SubsystemOrchestrator::new(&api);
        orch.shutdown();
        assert!(api.calls().is_empty());
    }
}
