//! # Resource: one driver or service and its container lifecycle.
//!
//! A [`Resource`] pairs an immutable [`ResourceSpec`] with the observed state
//! of its container. Operations only **issue** runtime calls; status moves
//! forward when the matching lifecycle event arrives, except where the runtime
//! answers "not found" (the container is gone, the resource is `Destroyed`).
//!
//! ## State machine
//! ```text
//!   New ──create──► CreateInProgress ──created──► Created ──start──► StartInProgress
//!                                                                        │ started
//!                                   ┌────────────────────────────────────┤
//!                       (readycheck)▼                       (no check)   ▼
//!   HealthcheckInProgress ◄──begin── Started                            Ready
//!        │  exit 0 ───────────────────────────────────────────────────►  │
//!        └─ exit ≠ 0 ──► Started                                         │
//!                                                                        │
//!   running-like ──stop──► StopInProgress ──stopped──► Stopped ──remove──► DestroyInProgress
//!                             │ deadline                                      │ destroyed
//!                             └──kill──► StopInProgress (killed)              ▼
//!                                                                         Destroyed
//! ```
//!
//! ## Rules
//! - An operation called from the wrong status is a logged no-op.
//! - A lifecycle event that does not match the current status is ignored,
//!   so duplicated or replayed events are harmless.
//! - The container handle is set by a successful `create` and cleared only
//!   when the resource reaches `Destroyed`.
//! - `exit_code` is captured once, by the first stopped event (missing → 127).

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ContainerError, RuntimeError};
use crate::runtime::{
    ContainerId, CreateRequest, LogForwarder, RESOURCE_LABEL, RuntimeRef, SESSION_LABEL,
};
use crate::spec::ResourceSpec;

/// Exit code recorded when the runtime does not report one.
pub const DEFAULT_EXIT_CODE: i32 = 127;

/// Lifecycle status of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    New,
    CreateInProgress,
    Created,
    StartInProgress,
    Started,
    HealthcheckInProgress,
    Ready,
    StopInProgress,
    Stopped,
    DestroyInProgress,
    Destroyed,
}

impl Status {
    /// Returns `true` while the container process may be running.
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Status::StartInProgress | Status::Started | Status::HealthcheckInProgress | Status::Ready
        )
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::CreateInProgress => "create_in_progress",
            Status::Created => "created",
            Status::StartInProgress => "start_in_progress",
            Status::Started => "started",
            Status::HealthcheckInProgress => "healthcheck_in_progress",
            Status::Ready => "ready",
            Status::StopInProgress => "stop_in_progress",
            Status::Stopped => "stopped",
            Status::DestroyInProgress => "destroy_in_progress",
            Status::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One driver or service of a run.
#[derive(Debug)]
pub struct Resource {
    name: String,
    spec: ResourceSpec,
    container_name: String,
    session_id: String,
    status: Status,
    container: Option<ContainerId>,
    exit_code: Option<i32>,
    deadline: Option<Instant>,
    killed: bool,
}

impl Resource {
    /// Creates a resource in status `New`.
    ///
    /// The container is named `{session}_{name}_{seq}`.
    pub fn new(name: impl Into<String>, spec: ResourceSpec, session_id: &str, seq: usize) -> Self {
        let name = name.into();
        Self {
            container_name: format!("{session_id}_{name}_{seq}"),
            session_id: session_id.to_string(),
            name,
            spec,
            status: Status::New,
            container: None,
            exit_code: None,
            deadline: None,
            killed: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Runtime container name.
    #[inline]
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Handle of the container, present from a successful create until destroyed.
    #[inline]
    pub fn container(&self) -> Option<&ContainerId> {
        self.container.as_ref()
    }

    /// Exit code of the container process, once stopped.
    #[inline]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Names of the resources that must be ready first.
    #[inline]
    pub fn dependencies(&self) -> &[String] {
        &self.spec.depends_on
    }

    /// Deadline of the current stop or remove phase.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once a kill was issued in the current stop phase.
    #[inline]
    pub fn killed(&self) -> bool {
        self.killed
    }

    /// Returns `true` if the current phase deadline has passed at `now`.
    pub fn is_overdue(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            debug!(resource = %self.name, from = %self.status, to = %status, "status changed");
            self.status = status;
        }
    }

    fn arm(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// The container is gone; nothing is left to stop or remove.
    fn gone(&mut self) {
        self.set_status(Status::Destroyed);
        self.container = None;
        self.deadline = None;
    }

    fn ignore(&self, op: &str) {
        warn!(resource = %self.name, status = %self.status, op, "operation ignored in current status");
    }

    fn create_request(&self) -> CreateRequest {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert(SESSION_LABEL.to_string(), self.session_id.clone());
        labels.insert(RESOURCE_LABEL.to_string(), self.name.clone());

        CreateRequest {
            name: self.container_name.clone(),
            image: self.spec.image.clone(),
            command: self.spec.command.clone(),
            healthcheck: self.spec.healthcheck.clone(),
            hostname: self.spec.hostname.clone(),
            environment: self.spec.environment.clone(),
            labels,
        }
    }

    // ---- operations ----

    /// Issues container creation. Valid from `New`.
    pub async fn create(&mut self, runtime: &RuntimeRef) -> Result<(), RuntimeError> {
        if self.status != Status::New {
            self.ignore("create");
            return Ok(());
        }
        let req = self.create_request();
        let id = runtime
            .create(&req)
            .await
            .map_err(|e| RuntimeError::container(&self.name, "create", e))?;

        info!(resource = %self.name, container = %id, image = %self.spec.image, "container created");
        self.container = Some(id);
        self.set_status(Status::CreateInProgress);
        Ok(())
    }

    /// Issues container start and begins forwarding its output. Valid from `Created`.
    pub async fn start(&mut self, runtime: &RuntimeRef) -> Result<(), RuntimeError> {
        let Some(id) = self.container.clone().filter(|_| self.status == Status::Created) else {
            self.ignore("start");
            return Ok(());
        };
        self.set_status(Status::StartInProgress);
        match runtime.start(&id).await {
            Ok(()) => {
                info!(resource = %self.name, container = %id, "container starting");
                LogForwarder::spawn(runtime, &self.name, &id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(resource = %self.name, container = %id, "container vanished before start");
                self.gone();
                Ok(())
            }
            Err(e) => Err(RuntimeError::container(&self.name, "start", e)),
        }
    }

    /// Marks a started resource as being probed. Valid from `Started`.
    pub fn begin_healthcheck(&mut self) {
        if self.status != Status::Started {
            self.ignore("begin_healthcheck");
            return;
        }
        if self.spec.readycheck.is_some() {
            self.set_status(Status::HealthcheckInProgress);
        } else {
            self.set_status(Status::Ready);
        }
    }

    /// Runs the readiness probe. Valid from `HealthcheckInProgress`.
    ///
    /// Exit code 0 → `Ready`; anything else → back to `Started` for another round.
    pub async fn check(&mut self, runtime: &RuntimeRef) -> Result<(), RuntimeError> {
        let Some(id) = self
            .container
            .clone()
            .filter(|_| self.status == Status::HealthcheckInProgress)
        else {
            self.ignore("check");
            return Ok(());
        };
        let Some(check) = self.spec.readycheck.clone() else {
            self.set_status(Status::Ready);
            return Ok(());
        };

        match runtime.exec(&id, &check.command, check.user.as_deref()).await {
            Ok(out) if out.exit_code == 0 => {
                info!(resource = %self.name, "ready");
                self.set_status(Status::Ready);
                Ok(())
            }
            Ok(out) => {
                debug!(resource = %self.name, exit_code = out.exit_code, output = %out.output.trim_end(), "readycheck failed");
                self.set_status(Status::Started);
                Ok(())
            }
            Err(e @ (ContainerError::NotFound { .. } | ContainerError::Conflict { .. })) => {
                debug!(resource = %self.name, error = %e, "readycheck could not run");
                self.set_status(Status::Started);
                Ok(())
            }
            Err(e) => Err(RuntimeError::container(&self.name, "exec", e)),
        }
    }

    /// Requests graceful termination.
    ///
    /// From a running-like status the container is signalled and the stop
    /// deadline armed. A resource that never started goes straight to
    /// `Stopped`. Already stopping or stopped is a no-op.
    pub async fn stop(&mut self, runtime: &RuntimeRef, cfg: &Config) -> Result<(), RuntimeError> {
        match self.status {
            Status::CreateInProgress | Status::Created => {
                self.set_status(Status::Stopped);
                Ok(())
            }
            Status::StopInProgress | Status::Stopped => Ok(()),
            s if s.is_running() => {
                let Some(id) = self.container.clone() else {
                    self.gone();
                    return Ok(());
                };
                self.set_status(Status::StopInProgress);
                self.arm(cfg.stop_timeout);
                self.killed = false;
                info!(resource = %self.name, container = %id, "stopping");
                self.absorb("stop", runtime.stop(&id).await)
            }
            _ => {
                self.ignore("stop");
                Ok(())
            }
        }
    }

    /// Terminates the container immediately. Valid from `StopInProgress`.
    pub async fn kill(&mut self, runtime: &RuntimeRef, cfg: &Config) -> Result<(), RuntimeError> {
        let Some(id) = self
            .container
            .clone()
            .filter(|_| self.status == Status::StopInProgress)
        else {
            self.ignore("kill");
            return Ok(());
        };
        warn!(resource = %self.name, container = %id, "stop deadline passed, killing");
        self.arm(cfg.kill_timeout);
        self.killed = true;
        self.absorb("kill", runtime.kill(&id).await)
    }

    /// Force-removes the container.
    ///
    /// Valid from `Created`, `StopInProgress` (escalation), `Stopped` and
    /// `DestroyInProgress` (retry after the remove deadline).
    pub async fn remove(&mut self, runtime: &RuntimeRef, cfg: &Config) -> Result<(), RuntimeError> {
        let valid = matches!(
            self.status,
            Status::Created | Status::StopInProgress | Status::Stopped | Status::DestroyInProgress
        );
        let Some(id) = self.container.clone().filter(|_| valid) else {
            self.ignore("remove");
            return Ok(());
        };
        self.set_status(Status::DestroyInProgress);
        self.arm(cfg.remove_timeout);
        info!(resource = %self.name, container = %id, "removing");
        self.absorb("remove", runtime.remove(&id, true).await)
    }

    /// Applies the shared recovery rules of stop, kill and remove.
    fn absorb(
        &mut self,
        op: &'static str,
        res: Result<(), ContainerError>,
    ) -> Result<(), RuntimeError> {
        match res {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(resource = %self.name, op, "container already gone");
                self.gone();
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                debug!(resource = %self.name, op, error = %e, "conflict ignored");
                Ok(())
            }
            Err(e) => Err(RuntimeError::container(&self.name, op, e)),
        }
    }

    // ---- lifecycle events ----

    /// The runtime confirmed creation.
    pub fn on_created(&mut self) {
        if self.status == Status::CreateInProgress {
            self.set_status(Status::Created);
        }
    }

    /// The runtime confirmed start.
    pub fn on_started(&mut self) {
        if self.status != Status::StartInProgress {
            return;
        }
        if self.spec.readycheck.is_some() {
            self.set_status(Status::Started);
        } else {
            info!(resource = %self.name, "ready");
            self.set_status(Status::Ready);
        }
    }

    /// The runtime is stopping the container (possibly on someone else's request).
    pub fn on_stopping(&mut self, cfg: &Config) {
        if self.status.is_running() {
            self.set_status(Status::StopInProgress);
            self.arm(cfg.stop_timeout);
            self.killed = false;
        }
    }

    /// The container process terminated.
    ///
    /// Returns `true` if this call moved the resource to `Stopped`.
    pub fn on_stopped(&mut self, exit_code: Option<i32>) -> bool {
        if !(self.status.is_running() || self.status == Status::StopInProgress) {
            return false;
        }
        let code = exit_code.unwrap_or(DEFAULT_EXIT_CODE);
        info!(resource = %self.name, exit_code = code, "container exited");
        self.exit_code = Some(code);
        self.deadline = None;
        self.set_status(Status::Stopped);
        true
    }

    /// The runtime confirmed removal.
    pub fn on_destroyed(&mut self) {
        if matches!(self.status, Status::Stopped | Status::DestroyInProgress) {
            debug!(resource = %self.name, "container removed");
            self.gone();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::runtime::{MemoryRuntime, Op};
    use crate::spec::ReadyCheck;

    fn setup(spec: ResourceSpec) -> (Arc<MemoryRuntime>, RuntimeRef, Resource) {
        let mem = Arc::new(MemoryRuntime::new());
        let rt: RuntimeRef = mem.clone();
        (mem, rt, Resource::new("db", spec, "s1", 1))
    }

    async fn started(spec: ResourceSpec) -> (Arc<MemoryRuntime>, RuntimeRef, Resource) {
        let (mem, rt, mut r) = setup(spec);
        r.create(&rt).await.unwrap();
        r.on_created();
        r.start(&rt).await.unwrap();
        r.on_started();
        (mem, rt, r)
    }

    #[tokio::test]
    async fn test_create_sets_handle_and_labels() {
        let (mem, rt, mut r) = setup(ResourceSpec::new("postgres"));
        assert_eq!(r.container_name(), "s1_db_1");
        r.create(&rt).await.unwrap();

        assert_eq!(r.status(), Status::CreateInProgress);
        assert_eq!(r.container(), mem.id_of("db").as_ref());
        r.on_created();
        assert_eq!(r.status(), Status::Created);
    }

    #[test]
    fn test_create_request_carries_spec_and_labels() {
        let spec = ResourceSpec::new("postgres:16").with_env("POSTGRES_PASSWORD", "secret");
        let req = Resource::new("db", spec, "s1", 1).create_request();

        assert_eq!(req.name, "s1_db_1");
        assert_eq!(req.image, "postgres:16");
        assert_eq!(req.environment.get("POSTGRES_PASSWORD").map(String::as_str), Some("secret"));
        assert_eq!(req.labels.get(SESSION_LABEL).map(String::as_str), Some("s1"));
        assert_eq!(req.labels.get(RESOURCE_LABEL).map(String::as_str), Some("db"));
    }

    #[tokio::test]
    async fn test_create_twice_is_noop() {
        let (mem, rt, mut r) = setup(ResourceSpec::new("postgres"));
        r.create(&rt).await.unwrap();
        r.create(&rt).await.unwrap();
        assert_eq!(mem.ops_for("db"), vec![Op::Create]);
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal() {
        let (mem, rt, mut r) = setup(ResourceSpec::new("postgres"));
        mem.fail_next(Op::Create, "db", ContainerError::api("no such image"));
        let err = r.create(&rt).await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_container");
        assert!(r.container().is_none());
    }

    #[tokio::test]
    async fn test_started_without_readycheck_is_ready() {
        let (_, _, r) = started(ResourceSpec::new("postgres")).await;
        assert_eq!(r.status(), Status::Ready);
    }

    #[tokio::test]
    async fn test_readycheck_rounds() {
        let spec = ResourceSpec::new("postgres").with_readycheck(ReadyCheck::new(["pg_isready"]));
        let (mem, rt, mut r) = started(spec).await;
        assert_eq!(r.status(), Status::Started);
        mem.script_exec("db", [1]);

        r.begin_healthcheck();
        assert_eq!(r.status(), Status::HealthcheckInProgress);
        r.check(&rt).await.unwrap();
        assert_eq!(r.status(), Status::Started);

        r.begin_healthcheck();
        r.check(&rt).await.unwrap();
        assert_eq!(r.status(), Status::Ready);
    }

    #[tokio::test]
    async fn test_readycheck_not_found_reverts_to_started() {
        let spec = ResourceSpec::new("postgres").with_readycheck(ReadyCheck::new(["true"]));
        let (mem, rt, mut r) = started(spec).await;
        mem.fail_next(Op::Exec, "db", ContainerError::NotFound { id: "x".into() });

        r.begin_healthcheck();
        r.check(&rt).await.unwrap();
        assert_eq!(r.status(), Status::Started);
    }

    #[tokio::test]
    async fn test_stop_arms_deadline() {
        let (mem, rt, mut r) = started(ResourceSpec::new("postgres")).await;
        let cfg = Config::default();
        r.stop(&rt, &cfg).await.unwrap();

        assert_eq!(r.status(), Status::StopInProgress);
        assert!(r.deadline().is_some());
        assert!(!r.killed());
        r.stop(&rt, &cfg).await.unwrap();
        assert_eq!(mem.ops_for("db").iter().filter(|op| **op == Op::Stop).count(), 1);
    }

    #[tokio::test]
    async fn test_stop_never_started_short_circuits() {
        let (mem, rt, mut r) = setup(ResourceSpec::new("postgres"));
        r.create(&rt).await.unwrap();
        r.stop(&rt, &Config::default()).await.unwrap();

        assert_eq!(r.status(), Status::Stopped);
        assert_eq!(mem.ops_for("db"), vec![Op::Create]);
    }

    #[tokio::test]
    async fn test_stopped_event_is_idempotent() {
        let (_, _, mut r) = started(ResourceSpec::new("postgres")).await;
        assert!(r.on_stopped(Some(3)));
        assert!(!r.on_stopped(Some(9)));
        assert_eq!(r.exit_code(), Some(3));
        assert_eq!(r.status(), Status::Stopped);
    }

    #[tokio::test]
    async fn test_missing_exit_code_defaults() {
        let (_, _, mut r) = started(ResourceSpec::new("postgres")).await;
        r.on_stopped(None);
        assert_eq!(r.exit_code(), Some(DEFAULT_EXIT_CODE));
    }

    #[tokio::test]
    async fn test_remove_not_found_destroys() {
        let (mem, rt, mut r) = started(ResourceSpec::new("postgres")).await;
        r.on_stopped(Some(0));
        mem.fail_next(Op::Remove, "db", ContainerError::NotFound { id: "x".into() });

        r.remove(&rt, &Config::default()).await.unwrap();
        assert_eq!(r.status(), Status::Destroyed);
        assert!(r.container().is_none());
    }

    #[tokio::test]
    async fn test_remove_conflict_keeps_waiting() {
        let (mem, rt, mut r) = started(ResourceSpec::new("postgres")).await;
        r.on_stopped(Some(0));
        mem.fail_next(
            Op::Remove,
            "db",
            ContainerError::Conflict {
                id: "x".into(),
                message: "removal in progress".into(),
            },
        );

        r.remove(&rt, &Config::default()).await.unwrap();
        assert_eq!(r.status(), Status::DestroyInProgress);
        r.on_destroyed();
        assert_eq!(r.status(), Status::Destroyed);
        assert!(r.container().is_none());
    }

    #[tokio::test]
    async fn test_remove_other_error_is_fatal() {
        let (mem, rt, mut r) = started(ResourceSpec::new("postgres")).await;
        r.on_stopped(Some(0));
        mem.fail_next(Op::Remove, "db", ContainerError::api("daemon down"));
        assert!(r.remove(&rt, &Config::default()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_marks_escalation() {
        let (mem, rt, mut r) = started(ResourceSpec::new("postgres")).await;
        let cfg = Config::default();
        r.stop(&rt, &cfg).await.unwrap();
        let first = r.deadline().unwrap();

        tokio::time::advance(cfg.stop_timeout).await;
        assert!(r.is_overdue(Instant::now()));
        r.kill(&rt, &cfg).await.unwrap();

        assert!(r.killed());
        assert_eq!(r.status(), Status::StopInProgress);
        assert!(r.deadline().unwrap() > first);
        assert!(!r.is_overdue(Instant::now()));
        assert_eq!(mem.ops_for("db").last(), Some(&Op::Kill));
    }

    #[tokio::test]
    async fn test_out_of_order_events_ignored() {
        let (_, _, mut r) = setup(ResourceSpec::new("postgres"));
        r.on_started();
        r.on_created();
        r.on_destroyed();
        assert!(!r.on_stopped(Some(1)));
        assert_eq!(r.status(), Status::New);
    }
}
