//! # RuntimeEventWatcher: runtime notifications → session events.
//!
//! Subscribes to the runtime's event stream and enqueues the translated
//! [`EventKind`]s. Translation is the only place that knows the runtime's
//! vocabulary:
//!
//! ```text
//! container create           → ContainerCreated
//! container start            → ContainerStarted
//! container kill | stop      → ContainerStopping
//! container die (exitCode)   → ContainerStopped
//! container destroy          → ContainerDestroyed
//! anything else              → dropped
//! ```
//!
//! ## Rules
//! - The subscription is opened in [`RuntimeEventWatcher::spawn`], before the
//!   task runs, so nothing emitted after `spawn` returns is missed.
//! - A broken stream is re-opened after `RESUBSCRIBE_DELAY` until the token is cancelled.

use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{EventKind, EventSender};
use crate::runtime::{ContainerId, RuntimeEvent, RuntimeRef};

/// Delay before re-subscribing after the stream broke.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Forwards runtime lifecycle notifications into the session queue.
pub struct RuntimeEventWatcher {
    runtime: RuntimeRef,
    tx: EventSender,
}

impl RuntimeEventWatcher {
    pub fn new(runtime: RuntimeRef, tx: EventSender) -> Self {
        Self { runtime, tx }
    }

    /// Subscribes and runs the watcher on its own task.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        let mut events = self.runtime.events();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = events.next() => match next {
                        Some(Ok(ev)) => {
                            let Some(kind) = translate(&ev) else { continue };
                            debug!(kind = kind.as_label(), action = %ev.action, "runtime event");
                            if !self.tx.publish(kind) {
                                break;
                            }
                        }
                        broken => {
                            match broken {
                                Some(Err(e)) => warn!(error = %e, "runtime event stream failed"),
                                _ => warn!("runtime event stream ended"),
                            }
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
                            }
                            events = self.runtime.events();
                        }
                    },
                }
            }
        })
    }
}

/// Maps one runtime notification onto the session vocabulary.
pub fn translate(ev: &RuntimeEvent) -> Option<EventKind> {
    if ev.typ != "container" {
        return None;
    }
    let id = ContainerId::new(ev.id.clone()?);
    match ev.action.as_str() {
        "create" => Some(EventKind::ContainerCreated { id }),
        "start" => Some(EventKind::ContainerStarted { id }),
        "kill" | "stop" => Some(EventKind::ContainerStopping { id }),
        "die" => Some(EventKind::ContainerStopped {
            id,
            exit_code: ev.attributes.get("exitCode").and_then(|c| c.parse().ok()),
        }),
        "destroy" => Some(EventKind::ContainerDestroyed { id }),
        _ => None,
    }
}
