//! # Per-phase action tables.
//!
//! Pure functions from the model's current state to the list of actions the
//! runner issues next. Every [`Status`] is handled explicitly in both tables.
//!
//! ```text
//! Status                  Execution                      Shutdown
//! ──────────────────────  ─────────────────────────────  ──────────────────────
//! New                     create if deps ready           -
//! CreateInProgress        wait                           stop
//! Created                 start if deps ready            remove
//! StartInProgress         wait                           stop
//! Started                 begin healthcheck              stop
//! HealthcheckInProgress   check                          stop
//! Ready                   wait (driver) / - (service)    stop
//! StopInProgress          kill / remove once overdue     kill / remove once overdue
//! Stopped                 remove                         remove
//! DestroyInProgress       remove again once overdue      remove again once overdue
//! Destroyed               -                              -
//! ```
//!
//! An empty list means nothing is left to do; the runner moves to `Done`.

use std::fmt;

use tokio::time::Instant;

use super::model::{DRIVER, RunModel};
use super::resource::{Resource, Status};

/// One step the runner issues against a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Create(String),
    Start(String),
    BeginHealthcheck(String),
    Check(String),
    Stop(String),
    Kill(String),
    Remove(String),
    /// Nothing to issue, but the resource is still pending.
    Wait(String),
}

impl Action {
    /// Resource the action targets.
    pub fn resource(&self) -> &str {
        match self {
            Action::Create(n)
            | Action::Start(n)
            | Action::BeginHealthcheck(n)
            | Action::Check(n)
            | Action::Stop(n)
            | Action::Kill(n)
            | Action::Remove(n)
            | Action::Wait(n) => n,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Action::Create(_) => "create",
            Action::Start(_) => "start",
            Action::BeginHealthcheck(_) => "begin_healthcheck",
            Action::Check(_) => "check",
            Action::Stop(_) => "stop",
            Action::Kill(_) => "kill",
            Action::Remove(_) => "remove",
            Action::Wait(_) => "wait",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_label(), self.resource())
    }
}

/// Stop/destroy escalation shared by both phases.
fn teardown_step(r: &Resource, now: Instant) -> Option<Action> {
    let name = r.name().to_string();
    match r.status() {
        Status::StopInProgress if r.is_overdue(now) && r.killed() => Some(Action::Remove(name)),
        Status::StopInProgress if r.is_overdue(now) => Some(Action::Kill(name)),
        Status::StopInProgress => Some(Action::Wait(name)),
        Status::Stopped => Some(Action::Remove(name)),
        Status::DestroyInProgress if r.is_overdue(now) => Some(Action::Remove(name)),
        Status::DestroyInProgress => Some(Action::Wait(name)),
        _ => None,
    }
}

/// Actions of the execution phase, in model order (driver first).
pub fn actions_for_execution(model: &RunModel, now: Instant) -> Vec<Action> {
    model
        .iter()
        .filter_map(|r| {
            let name = r.name().to_string();
            match r.status() {
                Status::New => model.can_create(r).then(|| Action::Create(name)),
                Status::CreateInProgress => Some(Action::Wait(name)),
                Status::Created => model.can_start(r).then(|| Action::Start(name)),
                Status::StartInProgress => Some(Action::Wait(name)),
                Status::Started => Some(Action::BeginHealthcheck(name)),
                Status::HealthcheckInProgress => Some(Action::Check(name)),
                Status::Ready => (r.name() == DRIVER).then(|| Action::Wait(name)),
                Status::StopInProgress | Status::Stopped | Status::DestroyInProgress => {
                    teardown_step(r, now)
                }
                Status::Destroyed => None,
            }
        })
        .collect()
}

/// Actions of the shutdown phase, in model order (driver first).
pub fn actions_for_shutdown(model: &RunModel, now: Instant) -> Vec<Action> {
    model
        .iter()
        .filter_map(|r| {
            let name = r.name().to_string();
            match r.status() {
                Status::New => None,
                Status::CreateInProgress => Some(Action::Stop(name)),
                Status::Created => Some(Action::Remove(name)),
                Status::StartInProgress
                | Status::Started
                | Status::HealthcheckInProgress
                | Status::Ready => Some(Action::Stop(name)),
                Status::StopInProgress | Status::Stopped | Status::DestroyInProgress => {
                    teardown_step(r, now)
                }
                Status::Destroyed => None,
            }
        })
        .collect()
}
