//! Event producers feeding the session queue.
//!
//! - [`EventTimer`] - periodic `Tick`
//! - [`RuntimeEventWatcher`] - container lifecycle notifications

mod timer;
mod watcher;

pub use timer::EventTimer;
pub use watcher::{RuntimeEventWatcher, translate};
