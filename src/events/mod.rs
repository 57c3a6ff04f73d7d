//! Session events: types and the shared queue.
//!
//! This module groups the event **data model** and the **queue** that merges
//! every producer into one ordered stream consumed by the runner.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] closed set of notifications plus ordering metadata
//! - [`EventQueue`], [`EventSender`] unbounded FIFO over `tokio::sync::mpsc`
//!
//! ## Quick reference
//! - **Producers**: `EventTimer` (ticks), `RuntimeEventWatcher` (container
//!   lifecycle), `ShutdownHandle` (shutdown requests).
//! - **Consumer**: `Runner::run()`, the only reader and the only mutator of
//!   resource state.

mod event;
mod queue;

pub use event::{Event, EventKind};
pub use queue::{EventQueue, EventSender, Recv};
