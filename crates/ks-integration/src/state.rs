//! Application states and their handlers
//!
//! The state set is closed. Handlers return a raw value so that a handler
//! producing something outside the set can be detected and corrected by the
//! driver rather than trusted.

use crate::events::{Event, EventSource, Liveness};
use crate::orchestrator::{PhaseFlags, SubsystemOrchestrator};
use ks_core::LaunchConfiguration;
use std::fmt;
use tracing::{debug, trace};

/// Top-level application state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum State {
    Exit = 0,
    Menu = 1,
    /// Character selection
    Selection = 2,
    /// In game
    Running = 3,
    Loading = 4,
    Credits = 5,
}

impl State {
    pub const ALL: [State; 6] = [
        State::Exit,
        State::Menu,
        State::Selection,
        State::Running,
        State::Loading,
        State::Credits,
    ];

    pub fn raw(self) -> i32 {
        self as i32
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<i32> for State {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(raw)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exit => "exit",
            Self::Menu => "menu",
            Self::Selection => "selection",
            Self::Running => "running",
            Self::Loading => "loading",
            Self::Credits => "credits",
        };
        write!(f, "{}", name)
    }
}

/// Everything a handler may touch
pub struct StateContext<'c, 'a> {
    pub config: &'c LaunchConfiguration,
    pub orchestrator: &'c mut SubsystemOrchestrator<'a>,
    pub events: &'c mut dyn EventSource,
    pub liveness: &'c Liveness,
}

/// Per-state handler, returns the raw next state
pub type StateHandler = fn(&mut StateContext<'_, '_>) -> i32;

/// Fixed dispatch table with one handler per state
#[derive(Clone, Copy)]
pub struct HandlerTable {
    handlers: [StateHandler; 6],
}

impl HandlerTable {
    /// Table with the standard handlers
    pub fn standard() -> Self {
        Self {
            handlers: [
                exit_handler,
                menu_handler,
                selection_handler,
                running_handler,
                loading_handler,
                credits_handler,
            ],
        }
    }

    /// Replace the handler for one state
    pub fn with_handler(mut self, state: State, handler: StateHandler) -> Self {
        self.handlers[state.index()] = handler;
        self
    }

    pub fn handler(&self, state: State) -> StateHandler {
        self.handlers[state.index()]
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Wait for the next event and turn it into a raw next state
///
/// A close request or a drained source clears the liveness flag and keeps
/// the current state; the loop then ends on the flag.
pub fn pump_events(ctx: &mut StateContext<'_, '_>, current: State) -> i32 {
    match ctx.events.next_event() {
        Some(Event::Navigate(raw)) => {
            trace!("Navigate {} -> {}", current, raw);
            raw
        }
        Some(Event::Idle) => current.raw(),
        Some(Event::CloseRequested) | None => {
            debug!("Close requested in {}", current);
            ctx.liveness.request_stop();
            current.raw()
        }
    }
}

pub fn exit_handler(_ctx: &mut StateContext<'_, '_>) -> i32 {
    State::Exit.raw()
}

pub fn menu_handler(ctx: &mut StateContext<'_, '_>) -> i32 {
    if ctx.config.skip_menu {
        debug!("Skipping menu");
        return State::Selection.raw();
    }
    if !ctx.orchestrator.flags().contains(PhaseFlags::MENU) {
        ctx.orchestrator.init_menu(ctx.config);
    }
    pump_events(ctx, State::Menu)
}

pub fn selection_handler(ctx: &mut StateContext<'_, '_>) -> i32 {
    pump_events(ctx, State::Selection)
}

pub fn running_handler(ctx: &mut StateContext<'_, '_>) -> i32 {
    pump_events(ctx, State::Running)
}

pub fn loading_handler(_ctx: &mut StateContext<'_, '_>) -> i32 {
    State::Menu.raw()
}

pub fn credits_handler(_ctx: &mut StateContext<'_, '_>) -> i32 {
    State::Menu.raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ScriptedEvents;
    use crate::testing::Recorder;

    #[test]
    fn test_state_round_trip() {
        for state in State::ALL {
            assert_eq!(State::try_from(state.raw()), Ok(state));
        }
        assert_eq!(State::try_from(6), Err(6));
        assert_eq!(State::try_from(-1), Err(-1));
        assert_eq!(State::try_from(99), Err(99));
    }

    #[test]
    fn test_display() {
        assert_eq!(State::Selection.to_string(), "selection");
    }

    fn seven(_ctx: &mut StateContext<'_, '_>) -> i32 {
        7
    }

    #[test]
    fn test_with_handler() {
        let table = HandlerTable::standard().with_handler(State::Credits, seven);
        assert_eq!(table.handler(State::Credits) as usize, seven as usize);
        assert_eq!(table.handler(State::Exit) as usize, exit_handler as usize);
    }

    fn step(config: &LaunchConfiguration, state: State, events: Vec<Event>) -> i32 {
        let api = Recorder::default();
        let mut orchestrator = SubsystemOrchestrator::new(&api);
        orchestrator.initialize(config).unwrap();
        let mut events = ScriptedEvents::new(events);
        let liveness = Liveness::new();
        let mut ctx = StateContext {
            config,
            orchestrator: &mut orchestrator,
            events: &mut events,
            liveness: &liveness,
        };
        (HandlerTable::standard().handler(state))(&mut ctx)
    }

    #[test]
    fn test_standard_handlers_stay_in_state_set() {
        let plain = LaunchConfiguration::default();
        let skip = LaunchConfiguration {
            skip_menu: true,
            ..LaunchConfiguration::default()
        };
        let scripts = [
            vec![Event::Idle],
            vec![Event::CloseRequested],
            Vec::new(),
            vec![Event::Navigate(State::Credits.raw())],
        ];

        for config in [&plain, &skip] {
            for state in State::ALL {
                for script in &scripts {
                    let raw = step(config, state, script.clone());
                    assert!(
                        State::try_from(raw).is_ok(),
                        "{} returned {} for {:?}",
                        state,
                        raw,
                        script
                    );
                }
            }
        }
    }
}
