//! Integration layer for the keystone launcher
//!
//! This crate turns loaded modules into a running application: the bootstrap
//! sequence, the typed engine surface bound from the call-site table, the
//! subsystem orchestrator, and the state machine that runs until exit.

pub mod bootstrap;
pub mod driver;
pub mod engine;
pub mod events;
pub mod notify;
pub mod orchestrator;
pub mod runner;
pub mod state;

#[cfg(test)]
mod testing;

pub use bootstrap::{BootContext, BootstrapSequencer, BootstrapStep, STANDARD_STEPS};
pub use driver::{LoopExit, StateMachineDriver};
pub use engine::{AuxStage, BoundEngine, Call, CallSite, EngineApi, Fallback, CALL_SITES};
pub use events::{ConsoleEvents, Event, EventSource, Liveness, ScriptedEvents};
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::{PhaseFlags, SubsystemOrchestrator};
pub use runner::{Launcher, RunOutcome};
pub use state::{HandlerTable, State, StateContext, StateHandler};
