//! # Shutdown requests: OS signals and the explicit handle.
//!
//! [`ShutdownHandle`] is the only way to ask a running session to shut down.
//! It enqueues [`EventKind::ShutdownRequested`]; the runner reacts on its own
//! task, so the request is never applied concurrently with other events.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a
//! termination signal.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by CI runners and orchestrators)
//! - `SIGQUIT`
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{EventKind, EventSender};

/// Cloneable handle that requests a graceful shutdown of one session.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: EventSender,
}

impl ShutdownHandle {
    pub(crate) fn new(tx: EventSender) -> Self {
        Self { tx }
    }

    /// Requests shutdown. Repeated requests are harmless.
    ///
    /// Returns `false` if the session is already gone.
    pub fn shutdown(&self) -> bool {
        self.tx.publish(EventKind::ShutdownRequested)
    }
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Turns every termination signal into a shutdown request until `token` is cancelled.
pub(crate) fn forward_signals(handle: ShutdownHandle, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                res = wait_for_shutdown_signal() => match res {
                    Ok(()) => {
                        info!("termination signal received");
                        if !handle.shutdown() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot listen for termination signals");
                        break;
                    }
                },
            }
        }
    })
}
