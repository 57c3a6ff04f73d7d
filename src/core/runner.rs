//! # Runner: the event loop that drives a run to completion.
//!
//! The runner is the single consumer of the [`EventQueue`]. For every event it:
//! 1. applies the event to the model (status updates, phase changes),
//! 2. computes the action list of the current phase,
//! 3. issues the actions in order, or moves to `Done` if the list is empty.
//!
//! ## Phases
//! ```text
//!   Execution ──(driver Stopped | ShutdownRequested)──► Shutdown ──(no actions)──► Done
//!       │                                                                            ▲
//!       └──────────────────────────────(no actions)──────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Phases only move forward.
//! - Every model mutation happens on the runner's task; producers only enqueue.
//! - A runtime failure that cannot be absorbed aborts the run with the error.
//! - The result is the driver's exit code; finishing without one is an error.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::actions::{Action, actions_for_execution, actions_for_shutdown};
use super::model::{DRIVER, RunModel};
use crate::error::RuntimeError;
use crate::events::{Event, EventKind, EventQueue, Recv};

/// Phase of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Bring resources up and let the driver run.
    Execution,
    /// Stop and remove everything.
    Shutdown,
    /// Nothing left to do.
    Done,
}

impl Phase {
    pub fn as_label(self) -> &'static str {
        match self {
            Phase::Execution => "execution",
            Phase::Shutdown => "shutdown",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Drives one [`RunModel`] through its phases.
pub struct Runner {
    model: RunModel,
    phase: Phase,
}

impl Runner {
    /// Creates a runner in the `Execution` phase.
    pub fn new(model: RunModel) -> Self {
        Self {
            model,
            phase: Phase::Execution,
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn model(&self) -> &RunModel {
        &self.model
    }

    #[inline]
    pub fn model_mut(&mut self) -> &mut RunModel {
        &mut self.model
    }

    /// Consumes events until the run is `Done` and returns the driver's exit code.
    pub async fn run(&mut self, queue: &mut EventQueue, poll: Duration) -> Result<i32, RuntimeError> {
        self.model.validate()?;
        info!(session = %self.model.session_id(), resources = self.model.len(), "run started");

        while self.phase != Phase::Done {
            match queue.recv_timeout(poll).await {
                Recv::Event(ev) => self.handle_event(&ev).await?,
                Recv::Timeout => continue,
                Recv::Closed => return Err(RuntimeError::EventStreamClosed),
            }
        }

        let code = self
            .model
            .driver()
            .and_then(|d| d.exit_code())
            .ok_or(RuntimeError::NoExitCode)?;
        info!(session = %self.model.session_id(), exit_code = code, "run finished");
        Ok(code)
    }

    /// Applies one event and issues the resulting actions.
    pub async fn handle_event(&mut self, ev: &Event) -> Result<(), RuntimeError> {
        if self.phase == Phase::Done {
            return Ok(());
        }
        debug!(seq = ev.seq, kind = ev.kind.as_label(), phase = %self.phase, "event");
        self.apply(ev);
        self.step(Instant::now()).await
    }

    /// Asks for shutdown. The next step stops every running resource.
    pub fn request_shutdown(&mut self) {
        match self.phase {
            Phase::Execution => {
                info!("shutdown requested");
                self.enter_shutdown();
            }
            Phase::Shutdown => info!("already shutting down"),
            Phase::Done => {}
        }
    }

    fn enter_shutdown(&mut self) {
        if self.phase == Phase::Execution {
            self.phase = Phase::Shutdown;
            info!(phase = %self.phase, "phase changed");
        }
    }

    fn apply(&mut self, ev: &Event) {
        match &ev.kind {
            EventKind::Tick => {}
            EventKind::ShutdownRequested => self.request_shutdown(),
            EventKind::ContainerCreated { id } => self.model.on_created(id),
            EventKind::ContainerStarted { id } => self.model.on_started(id),
            EventKind::ContainerStopping { id } => self.model.on_stopping(id),
            EventKind::ContainerStopped { id, exit_code } => {
                let stopped = self.model.on_stopped(id, *exit_code);
                if stopped.iter().any(|name| name == DRIVER) {
                    info!("driver stopped");
                    self.enter_shutdown();
                }
            }
            EventKind::ContainerDestroyed { id } => self.model.on_destroyed(id),
        }
    }

    /// Computes and issues the actions of the current phase at `now`.
    pub async fn step(&mut self, now: Instant) -> Result<(), RuntimeError> {
        let actions = match self.phase {
            Phase::Execution => actions_for_execution(&self.model, now),
            Phase::Shutdown => actions_for_shutdown(&self.model, now),
            Phase::Done => return Ok(()),
        };

        if actions.is_empty() {
            self.phase = Phase::Done;
            info!(phase = %self.phase, "phase changed");
            return Ok(());
        }

        for action in actions {
            self.issue(&action).await?;
        }
        Ok(())
    }

    async fn issue(&mut self, action: &Action) -> Result<(), RuntimeError> {
        let name = action.resource();
        let res = match action {
            Action::Create(_) => self.model.create(name).await,
            Action::Start(_) => self.model.start(name).await,
            Action::BeginHealthcheck(_) => {
                self.model.begin_healthcheck(name);
                Ok(())
            }
            Action::Check(_) => self.model.check(name).await,
            Action::Stop(_) => self.model.stop(name).await,
            Action::Kill(_) => self.model.kill(name).await,
            Action::Remove(_) => self.model.remove(name).await,
            Action::Wait(_) => return Ok(()),
        };
        if let Err(e) = &res {
            warn!(action = %action, error = %e, "action failed");
        }
        res
    }
}
