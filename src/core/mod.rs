//! Orchestration core.
//!
//! - [`resource`]: per-resource lifecycle state machine;
//! - [`model`]: the named resources of a run and their dependency rules;
//! - [`actions`]: pure per-phase action tables;
//! - [`runner`]: the event loop that applies events and issues actions;
//! - [`session`]: wires producers, runner and teardown together;
//! - [`shutdown`]: shutdown handle and OS signal forwarding.

mod actions;
mod model;
mod resource;
mod runner;
mod session;
mod shutdown;

pub use actions::{Action, actions_for_execution, actions_for_shutdown};
pub use model::{DRIVER, RunModel};
pub use resource::{DEFAULT_EXIT_CODE, Resource, Status};
pub use runner::{Phase, Runner};
pub use session::Session;
pub use shutdown::{ShutdownHandle, wait_for_shutdown_signal};
