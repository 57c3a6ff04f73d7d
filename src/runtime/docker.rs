//! Docker Engine backend.
//!
//! Implements [`ContainerRuntime`] on top of the Docker API (via bollard).
//! Calls return as soon as the daemon accepted them:
//! - `stop` sends `SIGTERM` through the kill endpoint instead of the blocking
//!   stop endpoint; the runner escalates to `kill` on its own deadline.
//! - `kill` sends `SIGKILL`.
//!
//! HTTP 404 is mapped to [`ContainerError::NotFound`], HTTP 409 to
//! [`ContainerError::Conflict`], everything else to [`ContainerError::Api`].

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HealthConfig;
use bollard::system::EventsOptions;
use futures::StreamExt;
use tracing::{debug, info};

use super::logs::split_lines;
use super::{
    ContainerId, ContainerRuntime, CreateRequest, ExecOutput, LogStream, RuntimeEvent,
    RuntimeEventStream,
};
use crate::error::ContainerError;

/// Label carrying the session id on every container of a session.
pub(crate) const SESSION_LABEL: &str = "testdrive.session";
/// Label carrying the resource name.
pub(crate) const RESOURCE_LABEL: &str = "testdrive.resource";

/// Container runtime backed by a Docker daemon.
#[derive(Clone, Debug)]
pub struct DockerRuntime {
    docker: Docker,
    /// Filters applied to the event subscription.
    event_filters: HashMap<String, Vec<String>>,
    /// Unix timestamp the subscription replays from.
    since: Option<String>,
}

impl DockerRuntime {
    /// Connects to the local daemon (`DOCKER_HOST` or the default socket) and pings it.
    pub async fn connect() -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| map_error("", e))?;
        docker.ping().await.map_err(|e| map_error("", e))?;

        let version = docker.version().await.ok().and_then(|v| v.version);
        info!(version = ?version, "connected to docker daemon");

        Ok(Self {
            docker,
            event_filters: HashMap::new(),
            since: None,
        })
    }

    /// Restricts the event subscription to containers of one session.
    ///
    /// Subscriptions replay from the moment this is called, so notifications
    /// emitted before the stream is first polled are not lost. Replayed
    /// duplicates are harmless to the runner.
    pub fn with_session(mut self, session_id: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.since = Some(now.to_string());
        self.event_filters.insert(
            "label".to_string(),
            vec![format!("{SESSION_LABEL}={session_id}")],
        );
        self.event_filters
            .insert("type".to_string(), vec!["container".to_string()]);
        self
    }

    async fn signal(&self, id: &ContainerId, signal: &str) -> Result<(), ContainerError> {
        self.docker
            .kill_container(id.as_str(), Some(KillContainerOptions { signal }))
            .await
            .map_err(|e| map_error(id.as_str(), e))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, req: &CreateRequest) -> Result<ContainerId, ContainerError> {
        let env: Vec<String> = req
            .environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config {
            image: Some(req.image.clone()),
            cmd: req.command.clone(),
            hostname: req.hostname.clone(),
            env: Some(env),
            labels: Some(req.labels.clone().into_iter().collect()),
            healthcheck: req.healthcheck.clone().map(|test| HealthConfig {
                test: Some(test),
                ..Default::default()
            }),
            tty: Some(false),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: req.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_error(&req.name, e))?;

        for warning in &response.warnings {
            debug!(container = %req.name, warning = %warning, "create warning");
        }
        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error(id.as_str(), e))
    }

    async fn stop(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.signal(id, "SIGTERM").await
    }

    async fn kill(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.signal(id, "SIGKILL").await
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(|e| map_error(id.as_str(), e))
    }

    async fn exec(
        &self,
        id: &ContainerId,
        command: &[String],
        user: Option<&str>,
    ) -> Result<ExecOutput, ContainerError> {
        let options = CreateExecOptions {
            cmd: Some(command.to_vec()),
            user: user.map(str::to_string),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id.as_str(), options)
            .await
            .map_err(|e| map_error(id.as_str(), e))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_error(id.as_str(), e))?;

        let mut output = String::new();
        if let StartExecResults::Attached { output: mut out, .. } = started {
            while let Some(chunk) = out.next().await {
                let chunk = chunk.map_err(|e| map_error(id.as_str(), e))?;
                output.push_str(&chunk.to_string());
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| map_error(id.as_str(), e))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            output,
        })
    }

    fn logs(&self, id: &ContainerId) -> LogStream {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let owner = id.as_str().to_string();

        let chunks = self
            .docker
            .logs(id.as_str(), Some(options))
            .map(move |chunk| {
                chunk
                    .map(|out| out.to_string())
                    .map_err(|e| map_error(&owner, e))
            })
            .boxed();
        split_lines(chunks)
    }

    fn events(&self) -> RuntimeEventStream {
        let options = EventsOptions::<String> {
            since: self.since.clone(),
            filters: self.event_filters.clone(),
            ..Default::default()
        };

        self.docker
            .events(Some(options))
            .map(|msg| match msg {
                Ok(msg) => {
                    let (id, attributes) = match msg.actor {
                        Some(actor) => (
                            actor.id,
                            actor.attributes.unwrap_or_default().into_iter().collect(),
                        ),
                        None => (None, Default::default()),
                    };
                    Ok(RuntimeEvent {
                        typ: msg.typ.map(|t| t.to_string()).unwrap_or_default(),
                        action: msg.action.unwrap_or_default(),
                        id,
                        attributes,
                    })
                }
                Err(e) => Err(ContainerError::Stream {
                    message: e.to_string(),
                }),
            })
            .boxed()
    }
}

/// Maps a bollard error onto the runtime error taxonomy.
fn map_error(id: &str, err: DockerError) -> ContainerError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::NotFound { id: id.to_string() },
        DockerError::DockerResponseServerError {
            status_code: 409,
            message,
        } => ContainerError::Conflict {
            id: id.to_string(),
            message,
        },
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => ContainerError::Api {
            status: Some(status_code),
            message,
        },
        other => ContainerError::api(other.to_string()),
    }
}
