//! Engine capability interface
//!
//! Every call the launcher makes into a capability module goes through
//! [`EngineApi`]. [`BoundEngine`] implements it on top of bindings resolved
//! once from [`CALL_SITES`]; an unresolved binding falls back to the call
//! site's documented [`Fallback`] instead of being invoked.

use ks_core::{CallbackHandle, RequirementGatePolicy, VideoMode};
use ks_loader::{Binding, ModuleLoader, Selector, Signature};
use std::ffi::c_void;
use std::fmt;
use tracing::{debug, trace, warn};

/// `void f(void)`
pub type VoidFn = extern "C" fn();
/// `BOOL f(void)`
pub type GateFn = extern "C" fn() -> i32;
/// `void f(BOOL)` / `void f(int)`
pub type IntArgFn = extern "C" fn(i32);
/// `BOOL __stdcall f(HINSTANCE, int mode, BOOL windowed, int reserved)`
pub type GraphicsInitFn = extern "system" fn(*mut c_void, i32, i32, i32) -> i32;
/// `BOOL f(BOOL windowed, int keyword)`
pub type RendererInitFn = extern "C" fn(i32, i32) -> i32;
/// `void *f(void)`
pub type InterfaceFn = extern "C" fn() -> *mut c_void;

/// Auxiliary engine stage, each with an init and a teardown call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxStage {
    First,
    Second,
    Third,
}

impl AuxStage {
    pub const ALL: [AuxStage; 3] = [AuxStage::First, AuxStage::Second, AuxStage::Third];
}

/// Capability calls made by the orchestrator and the state handlers
pub trait EngineApi {
    fn init_audio(&self);
    fn enable_sound(&self);
    fn init_aux(&self, stage: AuxStage);
    /// Hard gate; `false` ends the run
    fn validate_requirements(&self) -> bool;
    fn default_screen_mode(&self) -> bool;
    fn init_graphics(&self, mode: VideoMode, windowed: bool) -> bool;
    /// `render_keyword` indexes the renderer keyword table
    fn init_renderer(&self, windowed: bool, render_keyword: u32) -> bool;
    fn prepare_graphics_shutdown(&self);
    fn shutdown_graphics(&self);
    fn init_menu(&self);
    fn cleanup_menu(&self);
    fn set_framerate_lock(&self, enabled: bool);
    fn set_fps_display(&self, mode: i32);
    fn apply_gamma(&self);
    fn enable_wide_aspect(&self);
    fn shutdown_aux(&self, stage: AuxStage);
    /// Interface the client module exposes for callbacks, if any
    fn callback_interface(&self) -> Option<CallbackHandle>;
}

/// Every capability call, in call-site table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    InitAudio,
    EnableSound,
    InitAux1,
    InitAux2,
    InitAux3,
    ValidateRequirements,
    DefaultScreenMode,
    InitGraphics,
    InitRenderer,
    PrepareGraphicsShutdown,
    ShutdownGraphics,
    InitMenu,
    CleanupMenu,
    SetFramerateLock,
    SetFpsDisplay,
    ApplyGamma,
    EnableWideAspect,
    CloseEngine,
    ShutdownAux,
    ShutdownExternal,
    QueryInterface,
}

impl Call {
    /// Call-site table entry for this call
    pub fn site(self) -> &'static CallSite {
        &CALL_SITES[self as usize]
    }
}

/// Behavior of a call whose entry point is unresolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Nothing happens
    NoOp,
    /// The call reports this result
    Returns(bool),
    /// Result comes from the configured [`RequirementGatePolicy`]
    GatePolicy,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => write!(f, "no-op"),
            Self::Returns(value) => write!(f, "returns {}", value),
            Self::GatePolicy => write!(f, "gate policy"),
        }
    }
}

/// Where a capability call lives and what happens when it is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub call: Call,
    pub module: &'static str,
    pub selector: Selector,
    pub fallback: Fallback,
}

const fn site(call: Call, module: &'static str, selector: Selector, fallback: Fallback) -> CallSite {
    CallSite {
        call,
        module,
        selector,
        fallback,
    }
}

use Fallback::{GatePolicy, NoOp, Returns};
use Selector::{Name, Ordinal};

/// Call-site table, indexed by [`Call`]
pub static CALL_SITES: [CallSite; 21] = [
    site(Call::InitAudio, "D2Sound", Name("InitializeDirectSound"), NoOp),
    site(Call::EnableSound, "D2Sound", Ordinal(10022), NoOp),
    site(Call::InitAux1, "Fog", Ordinal(10111), NoOp),
    site(Call::InitAux2, "Fog", Name("StubFunction_NoOp"), NoOp),
    site(Call::InitAux3, "Fog", Ordinal(10096), NoOp),
    site(Call::ValidateRequirements, "D2Client", Name("ValidateSystemRequirements"), GatePolicy),
    site(Call::DefaultScreenMode, "D2Client", Name("GetDefaultScreenMode"), Returns(true)),
    site(Call::InitGraphics, "D2Gfx", Ordinal(10025), Returns(true)),
    site(Call::InitRenderer, "D2Gfx", Name("ToggleGameState"), Returns(true)),
    site(Call::PrepareGraphicsShutdown, "D2Gfx", Name("SetCleanupHandlerFlag"), NoOp),
    site(Call::ShutdownGraphics, "D2Gfx", Name("CleanupWindowAndDisplayError"), NoOp),
    site(Call::InitMenu, "D2Win", Name("InitializeGameData"), NoOp),
    site(Call::CleanupMenu, "D2Win", Name("CloseGameResources"), NoOp),
    site(Call::SetFramerateLock, "D2Win", Name("DispatchInitialization"), NoOp),
    site(Call::SetFpsDisplay, "D2Win", Name("InitializeResourceBuffers"), NoOp),
    site(Call::ApplyGamma, "D2Win", Name("InitializeGameEnvironment"), NoOp),
    site(Call::EnableWideAspect, "D2Win", Name("InitializeGameDllLibraries"), NoOp),
    site(Call::CloseEngine, "Fog", Name("CloseAllEventHandles"), NoOp),
    site(Call::ShutdownAux, "Fog", Name("DeinitializeGameResources"), NoOp),
    site(Call::ShutdownExternal, "Fog", Name("InitializeGameData"), NoOp),
    site(Call::QueryInterface, "D2Client", Name("QueryInterface"), NoOp),
];

/// Check that the call-site table is indexed by [`Call`] and only names
/// known modules
pub fn validate_call_sites() -> Result<(), String> {
    let known: Vec<&str> = ks_loader::module::known_modules().collect();
    for (index, entry) in CALL_SITES.iter().enumerate() {
        if entry.call as usize != index {
            return Err(format!("call site {:?} stored at index {}", entry.call, index));
        }
        if !known.contains(&entry.module) {
            return Err(format!("call site {:?} names unknown module {}", entry.call, entry.module));
        }
    }
    Ok(())
}

fn as_bool(value: i32) -> bool {
    value != 0
}

/// [`EngineApi`] backed by loaded modules
pub struct BoundEngine<'l> {
    init_audio: Binding<'l, VoidFn>,
    enable_sound: Binding<'l, VoidFn>,
    init_aux: [Binding<'l, VoidFn>; 3],
    validate_requirements: Binding<'l, GateFn>,
    default_screen_mode: Binding<'l, GateFn>,
    init_graphics: Binding<'l, GraphicsInitFn>,
    init_renderer: Binding<'l, RendererInitFn>,
    prepare_graphics_shutdown: Binding<'l, VoidFn>,
    shutdown_graphics: Binding<'l, VoidFn>,
    init_menu: Binding<'l, VoidFn>,
    cleanup_menu: Binding<'l, VoidFn>,
    set_framerate_lock: Binding<'l, IntArgFn>,
    set_fps_display: Binding<'l, IntArgFn>,
    apply_gamma: Binding<'l, VoidFn>,
    enable_wide_aspect: Binding<'l, VoidFn>,
    shutdown_aux: [Binding<'l, VoidFn>; 3],
    query_interface: Binding<'l, InterfaceFn>,
    gate_policy: RequirementGatePolicy,
    resolved: usize,
}

impl<'l> BoundEngine<'l> {
    /// Resolve every call site against the loaded modules
    ///
    /// # Safety
    ///
    /// The exports named in [`CALL_SITES`] must have the signatures of the
    /// corresponding function types in this module.
    pub unsafe fn bind(loader: &'l ModuleLoader, gate_policy: RequirementGatePolicy) -> Self {
        unsafe fn bind_site<'l, F: Signature>(
            loader: &'l ModuleLoader,
            resolved: &mut usize,
            call: Call,
        ) -> Binding<'l, F> {
            let site = call.site();
            let binding = loader.bind(site.module, site.selector);
            if binding.is_resolved() {
                *resolved += 1;
            } else {
                debug!(
                    "{:?} unresolved ({}:{}), fallback {}",
                    call, site.module, site.selector, site.fallback
                );
            }
            binding
        }

        let mut resolved = 0;
        let engine = Self {
            init_audio: bind_site(loader, &mut resolved, Call::InitAudio),
            enable_sound: bind_site(loader, &mut resolved, Call::EnableSound),
            init_aux: [
                bind_site(loader, &mut resolved, Call::InitAux1),
                bind_site(loader, &mut resolved, Call::InitAux2),
                bind_site(loader, &mut resolved, Call::InitAux3),
            ],
            validate_requirements: bind_site(loader, &mut resolved, Call::ValidateRequirements),
            default_screen_mode: bind_site(loader, &mut resolved, Call::DefaultScreenMode),
            init_graphics: bind_site(loader, &mut resolved, Call::InitGraphics),
            init_renderer: bind_site(loader, &mut resolved, Call::InitRenderer),
            prepare_graphics_shutdown: bind_site(loader, &mut resolved, Call::PrepareGraphicsShutdown),
            shutdown_graphics: bind_site(loader, &mut resolved, Call::ShutdownGraphics),
            init_menu: bind_site(loader, &mut resolved, Call::InitMenu),
            cleanup_menu: bind_site(loader, &mut resolved, Call::CleanupMenu),
            set_framerate_lock: bind_site(loader, &mut resolved, Call::SetFramerateLock),
            set_fps_display: bind_site(loader, &mut resolved, Call::SetFpsDisplay),
            apply_gamma: bind_site(loader, &mut resolved, Call::ApplyGamma),
            enable_wide_aspect: bind_site(loader, &mut resolved, Call::EnableWideAspect),
            shutdown_aux: [
                bind_site(loader, &mut resolved, Call::CloseEngine),
                bind_site(loader, &mut resolved, Call::ShutdownAux),
                bind_site(loader, &mut resolved, Call::ShutdownExternal),
            ],
            query_interface: bind_site(loader, &mut resolved, Call::QueryInterface),
            gate_policy,
            resolved,
        };
        debug!("Bound {} of {} call sites", engine.resolved_count(), CALL_SITES.len());
        engine
    }

    /// Number of call sites with a resolved entry point
    pub fn resolved_count(&self) -> usize {
        self.resolved
    }

    fn void(&self, binding: &Binding<'l, VoidFn>) {
        if !binding.call_or(false, |f| {
            f();
            true
        }) {
            trace!("{}:{} skipped", binding.module(), binding.selector());
        }
    }

    /// Result reported by an unresolved call
    fn fallback_result(&self, call: Call) -> bool {
        match call.site().fallback {
            Fallback::Returns(value) => value,
            Fallback::GatePolicy => self.gate_policy.default_outcome(),
            Fallback::NoOp => true,
        }
    }

    fn gate(&self, binding: &Binding<'l, GateFn>, call: Call) -> bool {
        binding.call_or(self.fallback_result(call), |f| as_bool(f()))
    }
}

fn aux_index(stage: AuxStage) -> usize {
    match stage {
        AuxStage::First => 0,
        AuxStage::Second => 1,
        AuxStage::Third => 2,
    }
}

impl EngineApi for BoundEngine<'_> {
    fn init_audio(&self) {
        self.void(&self.init_audio)
    }

    fn enable_sound(&self) {
        self.void(&self.enable_sound)
    }

    fn init_aux(&self, stage: AuxStage) {
        self.void(&self.init_aux[aux_index(stage)])
    }

    fn validate_requirements(&self) -> bool {
        if !self.validate_requirements.is_resolved() {
            let outcome = self.gate_policy.default_outcome();
            warn!(
                "Requirement check unavailable, policy {:?} {}",
                self.gate_policy,
                if outcome { "skips the check" } else { "fails the run" }
            );
            return outcome;
        }
        self.gate(&self.validate_requirements, Call::ValidateRequirements)
    }

    fn default_screen_mode(&self) -> bool {
        self.gate(&self.default_screen_mode, Call::DefaultScreenMode)
    }

    fn init_graphics(&self, mode: VideoMode, windowed: bool) -> bool {
        let fallback = self.fallback_result(Call::InitGraphics);
        self.init_graphics.call_or(fallback, |f| {
            as_bool(f(std::ptr::null_mut(), mode.raw() as i32, i32::from(windowed), 0))
        })
    }

    fn init_renderer(&self, windowed: bool, render_keyword: u32) -> bool {
        let fallback = self.fallback_result(Call::InitRenderer);
        let keyword = i32::try_from(render_keyword).unwrap_or(0);
        self.init_renderer
            .call_or(fallback, |f| as_bool(f(i32::from(windowed), keyword)))
    }

    fn prepare_graphics_shutdown(&self) {
        self.void(&self.prepare_graphics_shutdown)
    }

    fn shutdown_graphics(&self) {
        self.void(&self.shutdown_graphics)
    }

    fn init_menu(&self) {
        self.void(&self.init_menu)
    }

    fn cleanup_menu(&self) {
        self.void(&self.cleanup_menu)
    }

    fn set_framerate_lock(&self, enabled: bool) {
        self.set_framerate_lock.call_or((), |f| f(i32::from(enabled)))
    }

    fn set_fps_display(&self, mode: i32) {
        self.set_fps_display.call_or((), |f| f(mode))
    }

    fn apply_gamma(&self) {
        self.void(&self.apply_gamma)
    }

    fn enable_wide_aspect(&self) {
        self.void(&self.enable_wide_aspect)
    }

    fn shutdown_aux(&self, stage: AuxStage) {
        self.void(&self.shutdown_aux[aux_index(stage)])
    }

    fn callback_interface(&self) -> Option<CallbackHandle> {
        self.query_interface
            .call_or(None, |f| CallbackHandle::from_ptr(f()))
    }
}
