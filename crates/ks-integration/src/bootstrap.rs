//! Bootstrap sequencer
//!
//! Runs a fixed list of startup checks before anything else happens. The
//! first failing step aborts the run with that step's code; nothing after it
//! executes and nothing is retried.

use crate::engine::validate_call_sites;
use crate::notify::Notifier;
use ks_core::{CommandLine, LauncherError};
use ks_loader::module::validate_module_table;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Size of the allocation used to probe heap availability
pub const HEAP_PROBE_BYTES: usize = 1 << 20;

/// Host description captured by the version probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: &'static str,
    pub family: &'static str,
    pub arch: &'static str,
}

/// State gathered while bootstrapping, handed to the launch chain
#[derive(Debug, Clone, Default)]
pub struct BootContext {
    /// Arguments as received from the OS
    pub raw_args: Vec<OsString>,
    /// Arguments after Unicode validation
    pub args: Vec<String>,
    /// Environment snapshot; entries present before capture take precedence
    pub env: HashMap<String, String>,
    pub exe_path: Option<PathBuf>,
    pub platform: Option<Platform>,
    pub command_line: Option<CommandLine>,
    /// Standard input is a terminal
    pub interactive: bool,
    pub parallelism: usize,
}

impl BootContext {
    /// Context for the running process
    pub fn from_process() -> Self {
        Self::with_args(std::env::args_os())
    }

    /// Context with an explicit argument vector, `args[0]` being the program
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            raw_args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Preset an environment entry
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Directory holding the executable, once the image check has run
    pub fn exe_dir(&self) -> Option<PathBuf> {
        self.exe_path
            .as_deref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
    }
}

pub type StepAction = fn(&mut BootContext) -> Result<(), String>;

/// One ordered startup step
#[derive(Debug, Clone, Copy)]
pub struct BootstrapStep {
    /// Position in the sequence, starting at 1
    pub index: usize,
    pub name: &'static str,
    /// Process exit code when this step fails
    pub abort_code: i32,
    pub action: StepAction,
}

impl BootstrapStep {
    pub const fn new(index: usize, name: &'static str, abort_code: i32, action: StepAction) -> Self {
        Self {
            index,
            name,
            abort_code,
            action,
        }
    }
}

/// Standard startup steps in execution order
pub static STANDARD_STEPS: [BootstrapStep; 10] = [
    BootstrapStep::new(1, "version probe", 0x01, probe_version),
    BootstrapStep::new(2, "image check", 0x02, check_image),
    BootstrapStep::new(3, "heap check", 0x1C, check_heap),
    BootstrapStep::new(4, "threading check", 0x10, check_threading),
    BootstrapStep::new(5, "io check", 0x1B, check_io),
    BootstrapStep::new(6, "command line capture", 0x0A, capture_command_line),
    BootstrapStep::new(7, "environment capture", 0x0B, capture_environment),
    BootstrapStep::new(8, "argument parsing", 0x08, parse_arguments),
    BootstrapStep::new(9, "static state init", 0x09, init_static_state),
    BootstrapStep::new(10, "startup info", 0x0C, read_startup_info),
];

fn probe_version(ctx: &mut BootContext) -> Result<(), String> {
    use std::env::consts;

    if consts::OS.is_empty() || consts::ARCH.is_empty() {
        return Err("unknown host platform".to_string());
    }
    let platform = Platform {
        os: consts::OS,
        family: consts::FAMILY,
        arch: consts::ARCH,
    };
    debug!("Host {}/{} ({})", platform.os, platform.arch, platform.family);
    ctx.platform = Some(platform);
    Ok(())
}

fn check_image(ctx: &mut BootContext) -> Result<(), String> {
    let exe = std::env::current_exe().map_err(|e| e.to_string())?;
    if !exe.is_file() {
        return Err(format!("{} is not a file", exe.display()));
    }
    ctx.exe_path = Some(exe);
    Ok(())
}

fn check_heap(_ctx: &mut BootContext) -> Result<(), String> {
    let mut probe: Vec<u8> = Vec::new();
    probe
        .try_reserve(HEAP_PROBE_BYTES)
        .map_err(|e| e.to_string())
}

fn check_threading(ctx: &mut BootContext) -> Result<(), String> {
    let current = std::thread::current();
    ctx.parallelism = std::thread::available_parallelism()
        .map_err(|e| e.to_string())?
        .get();
    debug!(
        "Main thread {:?}, parallelism {}",
        current.name().unwrap_or("<unnamed>"),
        ctx.parallelism
    );
    Ok(())
}

fn check_io(_ctx: &mut BootContext) -> Result<(), String> {
    std::io::stderr().flush().map_err(|e| e.to_string())
}

fn capture_command_line(ctx: &mut BootContext) -> Result<(), String> {
    ctx.args = ctx
        .raw_args
        .iter()
        .map(|arg| {
            arg.clone()
                .into_string()
                .map_err(|bad| format!("argument {:?} is not valid Unicode", bad))
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(())
}

fn capture_environment(ctx: &mut BootContext) -> Result<(), String> {
    let mut skipped = 0;
    for (key, value) in std::env::vars_os() {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => {
                ctx.env.entry(key).or_insert(value);
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("Skipped {} non-Unicode environment entries", skipped);
    }
    Ok(())
}

fn parse_arguments(ctx: &mut BootContext) -> Result<(), String> {
    if ctx.args.is_empty() {
        return Err("empty argument vector".to_string());
    }
    ctx.command_line = Some(CommandLine::parse(&ctx.args));
    Ok(())
}

fn init_static_state(_ctx: &mut BootContext) -> Result<(), String> {
    validate_module_table()?;
    validate_call_sites()
}

fn read_startup_info(ctx: &mut BootContext) -> Result<(), String> {
    ctx.interactive = std::io::stdin().is_terminal();
    Ok(())
}

/// Runs the steps, then hands the context to the launch chain
#[derive(Debug, Clone)]
pub struct BootstrapSequencer {
    steps: Vec<BootstrapStep>,
}

impl BootstrapSequencer {
    pub fn standard() -> Self {
        Self::with_steps(STANDARD_STEPS.to_vec())
    }

    pub fn with_steps(steps: Vec<BootstrapStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[BootstrapStep] {
        &self.steps
    }

    /// Execute every step, then `hand_off`
    ///
    /// Returns the failing step's abort code, or whatever `hand_off` returns.
    pub fn run<F>(&self, ctx: &mut BootContext, notifier: &dyn Notifier, hand_off: F) -> i32
    where
        F: FnOnce(&BootContext) -> i32,
    {
        for step in &self.steps {
            debug!("Bootstrap step {}: {}", step.index, step.name);
            if let Err(reason) = (step.action)(ctx) {
                let err = LauncherError::Bootstrap {
                    index: step.index,
                    step: step.name,
                    code: step.abort_code,
                    reason,
                };
                error!("{}", err);
                notifier.fatal(err.title(), &err.to_string());
                return err.exit_code();
            }
        }

        info!("Bootstrap complete ({} steps)", self.steps.len());
        hand_off(ctx)
    }
}

impl Default for BootstrapSequencer {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static EXECUTED: RefCell<Vec<usize>> = RefCell::new(Vec::new());
        static NOTIFIED: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    struct TestNotifier;

    impl Notifier for TestNotifier {
        fn fatal(&self, title: &str, _message: &str) {
            NOTIFIED.with(|n| n.borrow_mut().push(title.to_string()));
        }
    }

    fn record(_ctx: &mut BootContext) -> Result<(), String> {
        EXECUTED.with(|e| {
            let mut executed = e.borrow_mut();
            let index = executed.len() + 1;
            executed.push(index);
        });
        Ok(())
    }

    fn fail(ctx: &mut BootContext) -> Result<(), String> {
        record(ctx)?;
        Err("boom".to_string())
    }

    fn steps_failing_at(k: usize) -> Vec<BootstrapStep> {
        STANDARD_STEPS
            .iter()
            .map(|s| {
                let action: StepAction = if s.index == k { fail } else { record };
                BootstrapStep { action, ..*s }
            })
            .collect()
    }

    #[test]
    fn test_failure_at_step_k() {
        for k in 1..=STANDARD_STEPS.len() {
            EXECUTED.with(|e| e.borrow_mut().clear());
            NOTIFIED.with(|n| n.borrow_mut().clear());

            let sequencer = BootstrapSequencer::with_steps(steps_failing_at(k));
            let mut ctx = BootContext::default();
            let code = sequencer.run(&mut ctx, &TestNotifier, |_| panic!("hand-off after failure"));

            assert_eq!(code, STANDARD_STEPS[k - 1].abort_code);
            assert_eq!(EXECUTED.with(|e| e.borrow().clone()), (1..=k).collect::<Vec<_>>());
            assert_eq!(NOTIFIED.with(|n| n.borrow().clone()), vec!["Startup Error"]);
        }
    }

    #[test]
    fn test_abort_codes_distinct() {
        let mut codes: Vec<i32> = STANDARD_STEPS.iter().map(|s| s.abort_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), STANDARD_STEPS.len());
        assert!(STANDARD_STEPS.iter().enumerate().all(|(i, s)| s.index == i + 1));
    }

    #[test]
    fn test_standard_steps_fill_context() {
        let mut ctx = BootContext::with_args(["keystone", "-w", "-ns"]).with_env("KEYSTONE_TEST", "1");
        let code = BootstrapSequencer::standard().run(&mut ctx, &TestNotifier, |ctx| {
            assert!(ctx.exe_path.is_some());
            assert!(ctx.platform.is_some());
            assert!(ctx.parallelism >= 1);
            7
        });

        assert_eq!(code, 7);
        let cmdline = ctx.command_line.unwrap();
        assert!(cmdline.windowed);
        assert!(cmdline.no_sound);
        assert_eq!(ctx.env.get("KEYSTONE_TEST").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_empty_argv_fails_parsing() {
        let mut ctx = BootContext::default();
        let code = BootstrapSequencer::standard().run(&mut ctx, &TestNotifier, |_| 0);
        assert_eq!(code, 0x08);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_argument() {
        use std::os::unix::ffi::OsStringExt;

        let mut ctx = BootContext::with_args([OsString::from("keystone"), OsString::from_vec(vec![0xff, 0xfe])]);
        let code = BootstrapSequencer::standard().run(&mut ctx, &TestNotifier, |_| 0);
        assert_eq!(code, 0x0A);
        assert!(ctx.command_line.is_none());
    }

    #[test]
    fn test_exe_dir() {
        let ctx = BootContext {
            exe_path: Some(PathBuf::from("/opt/game/keystone")),
            ..BootContext::default()
        };
        assert_eq!(ctx.exe_dir(), Some(PathBuf::from("/opt/game")));
    }
}
