//! # Event queue merging every producer into one ordered stream.
//!
//! [`EventQueue`] is a thin wrapper around an unbounded
//! [`tokio::sync::mpsc`] channel. Producers publish through cloneable
//! [`EventSender`]s; the runner is the single consumer.
//!
//! ## Architecture
//! ```text
//! Producers (many):                      Consumer (one):
//!   EventTimer          ──┐
//!   RuntimeEventWatcher ──┼──► EventQueue ──► Runner::run()
//!   ShutdownHandle      ──┘   (unbounded FIFO)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits.
//! - **FIFO**: events are received in the order they were enqueued.
//! - **Never closes while the queue lives**: the queue keeps one sender of its
//!   own, so `Recv::Closed` is only observed if that invariant is broken.

use std::time::Duration;

use tokio::sync::mpsc;

use super::event::{Event, EventKind};

/// Outcome of a bounded receive.
#[derive(Debug)]
pub enum Recv {
    /// An event was dequeued.
    Event(Event),
    /// Nothing arrived within the poll timeout.
    Timeout,
    /// Every sender is gone.
    Closed,
}

/// Producer side of the queue.
///
/// Cheap to clone; safe to use from any task or thread.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Wraps `kind` into an [`Event`] and enqueues it.
    ///
    /// Returns `false` if the consumer is gone (the event is dropped).
    pub fn publish(&self, kind: EventKind) -> bool {
        self.tx.send(Event::new(kind)).is_ok()
    }
}

/// Consumer side of the queue, owned by the runner.
#[derive(Debug)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Returns a new producer handle.
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Waits up to `timeout` for the next event.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Recv {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(ev)) => Recv::Event(ev),
            Ok(None) => Recv::Closed,
            Err(_elapsed) => Recv::Timeout,
        }
    }

    /// Dequeues an event if one is immediately available.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ContainerId;

    #[tokio::test]
    async fn test_fifo_across_senders() {
        let mut queue = EventQueue::new();
        let a = queue.sender();
        let b = queue.sender();

        a.publish(EventKind::Tick);
        b.publish(EventKind::ContainerCreated {
            id: ContainerId::new("c1"),
        });
        a.publish(EventKind::ShutdownRequested);

        let labels: Vec<&'static str> = std::iter::from_fn(|| queue.try_recv())
            .map(|ev| ev.kind.as_label())
            .collect();
        assert_eq!(
            labels,
            vec!["tick", "container_created", "shutdown_requested"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_when_empty() {
        let mut queue = EventQueue::new();
        assert!(matches!(
            queue.recv_timeout(Duration::from_millis(300)).await,
            Recv::Timeout
        ));
    }

    #[tokio::test]
    async fn test_publish_from_spawned_task() {
        let mut queue = EventQueue::new();
        let tx = queue.sender();
        tokio::spawn(async move {
            tx.publish(EventKind::Tick);
        })
        .await
        .unwrap();

        match queue.recv_timeout(Duration::from_secs(1)).await {
            Recv::Event(ev) => assert_eq!(ev.kind, EventKind::Tick),
            other => panic!("unexpected {other:?}"),
        }
    }
}
