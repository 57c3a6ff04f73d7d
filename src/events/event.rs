//! # Events consumed by the runner.
//!
//! [`EventKind`] is a closed set of variants, each carrying only the fields it
//! needs. Runtime-native notifications are decoded into it once, at the
//! watcher boundary; the runner never looks at the runtime's own event shape.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. The queue delivers events in arrival order; `seq` is kept for
//! logs so interleavings of producers can be reconstructed.
//!
//! ## Example
//! ```rust
//! use testdrive::{ContainerId, Event, EventKind};
//!
//! let ev = Event::new(EventKind::ContainerStopped {
//!     id: ContainerId::new("4f1c"),
//!     exit_code: Some(0),
//! });
//!
//! assert_eq!(ev.kind.as_label(), "container_stopped");
//! assert_eq!(ev.container_id().map(|id| id.as_str()), Some("4f1c"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::runtime::ContainerId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Periodic re-drive of the scheduler (emitted by the timer).
    Tick,

    /// The runtime confirmed that a container was created.
    ContainerCreated {
        /// Affected container.
        id: ContainerId,
    },

    /// The runtime confirmed that a container was started.
    ContainerStarted {
        /// Affected container.
        id: ContainerId,
    },

    /// The runtime reported that a container is being stopped or killed.
    ContainerStopping {
        /// Affected container.
        id: ContainerId,
    },

    /// The runtime confirmed that a container's process terminated.
    ContainerStopped {
        /// Affected container.
        id: ContainerId,
        /// Exit code attribute, `None` when absent or unparsable.
        exit_code: Option<i32>,
    },

    /// The runtime confirmed that a container was removed.
    ContainerDestroyed {
        /// Affected container.
        id: ContainerId,
    },

    /// An external trigger (OS signal, caller) asked the session to shut down.
    ShutdownRequested,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::Tick => "tick",
            EventKind::ContainerCreated { .. } => "container_created",
            EventKind::ContainerStarted { .. } => "container_started",
            EventKind::ContainerStopping { .. } => "container_stopping",
            EventKind::ContainerStopped { .. } => "container_stopped",
            EventKind::ContainerDestroyed { .. } => "container_destroyed",
            EventKind::ShutdownRequested => "shutdown_requested",
        }
    }
}

/// Session event with ordering metadata.
///
/// - `seq`: monotonic global sequence
/// - `at`: wall-clock timestamp (for logs)
/// - `kind`: the notification itself
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification and payload.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
        }
    }

    /// Returns the container identity carried by container events.
    #[inline]
    pub fn container_id(&self) -> Option<&ContainerId> {
        match &self.kind {
            EventKind::ContainerCreated { id }
            | EventKind::ContainerStarted { id }
            | EventKind::ContainerStopping { id }
            | EventKind::ContainerStopped { id, .. }
            | EventKind::ContainerDestroyed { id } => Some(id),
            EventKind::Tick | EventKind::ShutdownRequested => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::Tick);
        let b = Event::new(EventKind::Tick);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_container_id_only_on_container_events() {
        assert!(Event::new(EventKind::Tick).container_id().is_none());
        assert!(Event::new(EventKind::ShutdownRequested).container_id().is_none());

        let ev = Event::new(EventKind::ContainerDestroyed {
            id: ContainerId::new("c9"),
        });
        assert_eq!(ev.container_id(), Some(&ContainerId::new("c9")));
    }
}
