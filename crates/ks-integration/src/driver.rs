//! State machine driver
//!
//! Runs the top-level loop from [`State::Menu`] until a handler yields
//! [`State::Exit`], the liveness flag is cleared or a handler returns a value
//! outside the state set. Shutdown runs exactly once however the loop ends.

use crate::events::{EventSource, Liveness};
use crate::orchestrator::{PhaseFlags, SubsystemOrchestrator};
use crate::state::{HandlerTable, State, StateContext};
use ks_core::LaunchConfiguration;
use tracing::{debug, info, trace, warn};

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A handler returned [`State::Exit`]
    Exited,
    /// The liveness flag was cleared
    Cancelled,
    /// A handler returned a value outside the state set
    Corrupted { value: i32 },
}

pub struct StateMachineDriver {
    handlers: HandlerTable,
    liveness: Liveness,
}

impl StateMachineDriver {
    pub fn new(handlers: HandlerTable, liveness: Liveness) -> Self {
        Self { handlers, liveness }
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Run the loop, then shut every initialized phase down
    pub fn run(
        &self,
        config: &LaunchConfiguration,
        orchestrator: &mut SubsystemOrchestrator<'_>,
        events: &mut dyn EventSource,
    ) -> LoopExit {
        info!("Entering state loop");
        let exit = self.run_loop(config, orchestrator, events);
        match exit {
            LoopExit::Corrupted { value } => {
                warn!("State value {} out of range, forcing exit", value)
            }
            other => info!("State loop finished: {:?}", other),
        }

        orchestrator.shutdown();
        exit
    }

    fn run_loop(
        &self,
        config: &LaunchConfiguration,
        orchestrator: &mut SubsystemOrchestrator<'_>,
        events: &mut dyn EventSource,
    ) -> LoopExit {
        let mut raw = State::Menu.raw();
        let mut previous = None;

        loop {
            // corruption outranks a stop requested in the same step
            let state = match State::try_from(raw) {
                Ok(state) => state,
                Err(value) => return LoopExit::Corrupted { value },
            };
            if !self.liveness.is_alive() {
                return LoopExit::Cancelled;
            }
            if state == State::Exit {
                return LoopExit::Exited;
            }

            if state == State::Running && previous != Some(State::Running) {
                enter_running(orchestrator);
            }
            if previous != Some(state) {
                debug!("State -> {}", state);
            }

            let mut ctx = StateContext {
                config,
                orchestrator: &mut *orchestrator,
                events: &mut *events,
                liveness: &self.liveness,
            };
            raw = (self.handlers.handler(state))(&mut ctx);
            trace!("{} returned {}", state, raw);
            previous = Some(state);
        }
    }
}

/// Side effects of entering the running state from any other state
fn enter_running(orchestrator: &mut SubsystemOrchestrator<'_>) {
    if orchestrator.flags().contains(PhaseFlags::MENU) {
        orchestrator.teardown_menu();
    }
    orchestrator.prepare_graphics_shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, ScriptedEvents};
    use crate::testing::Recorder;

    fn run_script(
        config: &LaunchConfiguration,
        handlers: HandlerTable,
        events: Vec<Event>,
    ) -> (Recorder, LoopExit) {
        let api = Recorder::default();
        let exit = {
            let mut orch = SubsystemOrchestrator::new(&api);
            orch.initialize(config).unwrap();
            let driver = StateMachineDriver::new(handlers, Liveness::new());
            driver.run(config, &mut orch, &mut ScriptedEvents::new(events))
        };
        (api, exit)
    }

    #[test]
    fn test_navigate_to_exit() {
        let (api, exit) = run_script(
            &LaunchConfiguration::default(),
            HandlerTable::standard(),
            vec![Event::Idle, Event::Navigate(0)],
        );
        assert_eq!(exit, LoopExit::Exited);
        assert_eq!(api.count("init_menu"), 1);
        assert_eq!(api.count("cleanup_menu"), 1);
        assert_eq!(api.count("shutdown_graphics"), 1);
    }

    #[test]
    fn test_entering_running_tears_menu_down() {
        let (api, exit) = run_script(
            &LaunchConfiguration::default(),
            HandlerTable::standard(),
            vec![Event::Navigate(2), Event::Navigate(3), Event::Idle, Event::CloseRequested],
        );
        assert_eq!(exit, LoopExit::Cancelled);

        let calls = api.calls();
        let cleanup = calls.iter().position(|c| c == "cleanup_menu").unwrap();
        assert_eq!(calls[cleanup + 1], "prepare_graphics_shutdown");
        // hook fires once, staying in Running does not repeat it
        assert_eq!(api.count("prepare_graphics_shutdown"), 2);
        assert_eq!(api.count("cleanup_menu"), 1);
    }

    #[test]
    fn test_menu_reinitialized_after_running() {
        let (api, _) = run_script(
            &LaunchConfiguration::default(),
            HandlerTable::standard(),
            vec![Event::Navigate(3), Event::Navigate(1), Event::Navigate(0)],
        );
        assert_eq!(api.count("init_menu"), 2);
        assert_eq!(api.count("cleanup_menu"), 2);
    }

    #[test]
    fn test_skip_menu_goes_to_selection() {
        let config = LaunchConfiguration {
            skip_menu: true,
            ..LaunchConfiguration::default()
        };
        let (api, exit) = run_script(&config, HandlerTable::standard(), vec![Event::CloseRequested]);

        assert_eq!(exit, LoopExit::Cancelled);
        assert_eq!(api.count("init_menu"), 0);
        assert_eq!(api.count("cleanup_menu"), 0);
    }

    fn ninety_nine(_ctx: &mut StateContext<'_, '_>) -> i32 {
        99
    }

    #[test]
    fn test_out_of_range_forces_exit() {
        let handlers = HandlerTable::standard().with_handler(State::Selection, ninety_nine);
        let (api, exit) = run_script(&LaunchConfiguration::default(), handlers, vec![Event::Navigate(2)]);

        assert_eq!(exit, LoopExit::Corrupted { value: 99 });
        assert_eq!(api.count("shutdown_graphics"), 1);
        assert_eq!(api.count("shutdown_aux Third"), 1);
    }

    fn stop_then_ninety_nine(ctx: &mut StateContext<'_, '_>) -> i32 {
        ctx.liveness.request_stop();
        99
    }

    #[test]
    fn test_out_of_range_wins_over_stop() {
        let handlers = HandlerTable::standard().with_handler(State::Selection, stop_then_ninety_nine);
        let (api, exit) = run_script(&LaunchConfiguration::default(), handlers, vec![Event::Navigate(2)]);

        assert_eq!(exit, LoopExit::Corrupted { value: 99 });
        assert_eq!(api.count("shutdown_graphics"), 1);
    }

    #[test]
    fn test_loading_and_credits_return_to_menu() {
        let (api, exit) = run_script(
            &LaunchConfiguration::default(),
            HandlerTable::standard(),
            vec![Event::Navigate(4), Event::Navigate(5), Event::Navigate(0)],
        );
        assert_eq!(exit, LoopExit::Exited);
        assert_eq!(api.count("init_menu"), 1);
    }

    #[test]
    fn test_stopped_before_start() {
        let api = Recorder::default();
        let config = LaunchConfiguration::default();
        let mut orch = SubsystemOrchestrator::new(&api);
        orch.initialize(&config).unwrap();

        let liveness = Liveness::new();
        liveness.request_stop();
        let driver = StateMachineDriver::new(HandlerTable::standard(), liveness);
        let mut events = ScriptedEvents::new([Event::Navigate(0)]);

        assert_eq!(driver.run(&config, &mut orch, &mut events), LoopExit::Cancelled);
        assert_eq!(events.remaining(), 1);
        assert!(orch.flags().is_empty());
    }
}
