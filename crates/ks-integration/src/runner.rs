//! Launcher that ties all components together
//!
//! Data flow: bootstrap, configuration, module loading, binding, subsystem
//! initialization, state loop, shutdown, module release. Every fatal outcome
//! is funnelled into a [`RunOutcome`] and reported from one place.

use crate::bootstrap::{BootContext, BootstrapSequencer};
use crate::driver::{LoopExit, StateMachineDriver};
use crate::engine::{BoundEngine, EngineApi};
use crate::events::{ConsoleEvents, EventSource, Liveness};
use crate::notify::{LogNotifier, Notifier};
use crate::orchestrator::SubsystemOrchestrator;
use crate::state::HandlerTable;
use ks_core::{exit_code, LaunchConfigBuilder, LaunchConfiguration, LauncherError};
use ks_loader::{module_set, ModuleBackend, ModuleLoader, NativeBackend};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Result of one launch chain
#[derive(Debug)]
pub enum RunOutcome {
    /// The state loop ended through Exit or a close request
    Completed,
    Fatal(LauncherError),
    /// The state loop ended on an out-of-range state value
    StateCorrupted { value: i32 },
}

impl RunOutcome {
    /// Process exit code for this outcome
    ///
    /// State corruption is corrected to Exit and terminates normally.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed | Self::StateCorrupted { .. } => exit_code::SUCCESS,
            Self::Fatal(err) => err.exit_code(),
        }
    }
}

/// One process run, from bootstrap to module release
pub struct Launcher {
    boot: BootContext,
    sequencer: BootstrapSequencer,
    backend: Box<dyn ModuleBackend>,
    search_dirs: Option<Vec<PathBuf>>,
    config_builder: Option<LaunchConfigBuilder>,
    events: Option<Box<dyn EventSource>>,
    notifier: Box<dyn Notifier>,
    handlers: HandlerTable,
    liveness: Liveness,
}

impl Launcher {
    /// Launcher for the current process with the native module backend
    pub fn new() -> Self {
        Self {
            boot: BootContext::from_process(),
            sequencer: BootstrapSequencer::standard(),
            backend: Box::new(NativeBackend::new()),
            search_dirs: None,
            config_builder: None,
            events: None,
            notifier: Box::new(LogNotifier),
            handlers: HandlerTable::standard(),
            liveness: Liveness::new(),
        }
    }

    pub fn with_boot_context(mut self, boot: BootContext) -> Self {
        self.boot = boot;
        self
    }

    pub fn with_sequencer(mut self, sequencer: BootstrapSequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    pub fn with_backend(mut self, backend: impl ModuleBackend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    /// Search these directories instead of install dir and working dir
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = Some(dirs);
        self
    }

    pub fn with_config_builder(mut self, builder: LaunchConfigBuilder) -> Self {
        self.config_builder = Some(builder);
        self
    }

    pub fn with_events(mut self, events: impl EventSource + 'static) -> Self {
        self.events = Some(Box::new(events));
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    /// Flag that stops the state loop when cleared
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Run everything and return the process exit code
    pub fn run(self) -> i32 {
        let Launcher {
            mut boot,
            sequencer,
            backend,
            search_dirs,
            config_builder,
            events,
            notifier,
            handlers,
            liveness,
        } = self;

        let chain = LaunchChain {
            backend,
            search_dirs,
            config_builder,
            events,
            handlers,
            liveness,
        };
        let code = sequencer.run(&mut boot, notifier.as_ref(), |ctx| {
            let outcome = chain.run(ctx);
            match &outcome {
                RunOutcome::Fatal(err) => notifier.fatal(err.title(), &err.to_string()),
                RunOutcome::StateCorrupted { value } => {
                    warn!("Run ended on corrupted state {}", value)
                }
                RunOutcome::Completed => {}
            }
            outcome.exit_code()
        });

        info!("Exiting with code {:#04x}", code);
        code
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything after bootstrap
struct LaunchChain {
    backend: Box<dyn ModuleBackend>,
    search_dirs: Option<Vec<PathBuf>>,
    config_builder: Option<LaunchConfigBuilder>,
    events: Option<Box<dyn EventSource>>,
    handlers: HandlerTable,
    liveness: Liveness,
}

impl LaunchChain {
    fn run(self, ctx: &BootContext) -> RunOutcome {
        if let Some(platform) = &ctx.platform {
            info!(
                "Launching on {}/{} ({} threads available)",
                platform.os, platform.arch, ctx.parallelism
            );
        }
        let exe_dir = ctx.exe_dir().unwrap_or_else(|| PathBuf::from("."));
        let builder = self
            .config_builder
            .unwrap_or_else(|| LaunchConfigBuilder::new(exe_dir));
        let config = match &ctx.command_line {
            Some(cmdline) => builder.build_parsed(cmdline, &ctx.args, &ctx.env),
            None => builder.build(&ctx.args, &ctx.env),
        };

        let mut loader = match self.search_dirs {
            Some(dirs) => ModuleLoader::with_search_dirs(self.backend, dirs),
            None => ModuleLoader::new(self.backend, &config.install_path),
        };
        if let Err(err) = loader.load_set(&module_set(config.game_mode)) {
            loader.unload_all();
            return RunOutcome::Fatal(err);
        }

        let mut events = self.events.unwrap_or_else(|| console_events(ctx.interactive));
        let driver = StateMachineDriver::new(self.handlers, self.liveness);
        let result = run_engine(&loader, &config, &driver, events.as_mut());
        loader.unload_all();

        match result {
            Err(err) => RunOutcome::Fatal(err),
            Ok(LoopExit::Corrupted { value }) => RunOutcome::StateCorrupted { value },
            Ok(LoopExit::Exited | LoopExit::Cancelled) => RunOutcome::Completed,
        }
    }
}

/// Bind, initialize and drive the state loop; bindings end with this call
fn run_engine(
    loader: &ModuleLoader,
    config: &LaunchConfiguration,
    driver: &StateMachineDriver,
    events: &mut dyn EventSource,
) -> ks_core::Result<LoopExit> {
    // SAFETY: the call-site table declares each export with the signature
    // the modules are built against.
    let engine = unsafe { BoundEngine::bind(loader, config.requirement_gate) };
    publish_callback(&engine, config);
    let mut orchestrator = SubsystemOrchestrator::new(&engine);

    if let Err(err) = orchestrator.initialize(config) {
        orchestrator.shutdown();
        return Err(err);
    }
    Ok(driver.run(config, &mut orchestrator, events))
}

/// Default event source; prompts only when a terminal is attached
fn console_events(interactive: bool) -> Box<dyn EventSource> {
    debug!("Reading commands from stdin (interactive: {})", interactive);
    if interactive {
        Box::new(ConsoleEvents::stdin().with_prompt(std::io::stderr()))
    } else {
        Box::new(ConsoleEvents::stdin())
    }
}

/// Hand the client callback interface to the configuration slot
fn publish_callback(api: &dyn EngineApi, config: &LaunchConfiguration) {
    let Some(handle) = api.callback_interface() else {
        debug!("No callback interface exported");
        return;
    };
    if let Err(rejected) = config.callback.publish(handle) {
        warn!(
            "Callback interface {:p} rejected, slot already holds {:?}",
            rejected.as_ptr(),
            config.callback.get()
        );
    }
}
