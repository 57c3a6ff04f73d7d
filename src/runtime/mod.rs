//! # Container runtime collaborator.
//!
//! The orchestration core talks to containers only through the
//! [`ContainerRuntime`] trait. [`DockerRuntime`] implements it on top of the
//! Docker Engine API; [`MemoryRuntime`] keeps everything in memory for dry
//! runs and tests.
//!
//! ## Contract
//! - `create` returns the identity that later lifecycle events carry.
//! - `start`/`stop`/`kill`/`remove` only **issue** the operation; completion is
//!   learned from the event stream, never from the call itself.
//! - `exec` is synchronous: it returns once the probe command has exited.
//! - "not found" is reported as [`ContainerError::NotFound`] and "already in
//!   the requested state" as [`ContainerError::Conflict`].
//!
//! [`ContainerError::NotFound`]: crate::ContainerError::NotFound
//! [`ContainerError::Conflict`]: crate::ContainerError::Conflict

mod docker;
mod logs;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ContainerError;

pub use docker::DockerRuntime;
pub use logs::LogForwarder;
pub use memory::{Call, MemoryRuntime, Op};

pub(crate) use docker::{RESOURCE_LABEL, SESSION_LABEL};

/// Shared handle to a runtime implementation.
pub type RuntimeRef = Arc<dyn ContainerRuntime>;

/// Stream of runtime-native lifecycle notifications.
pub type RuntimeEventStream = BoxStream<'static, Result<RuntimeEvent, ContainerError>>;

/// Stream of output lines of one container (stdout and stderr interleaved).
pub type LogStream = BoxStream<'static, Result<String, ContainerError>>;

/// Identity of a container as assigned by the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(String);

impl ContainerId {
    /// Wraps a runtime-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the full identifier.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 12 characters (Docker's short form).
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// Everything the runtime needs to create one container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateRequest {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command override (`None` keeps the image default).
    pub command: Option<Vec<String>>,
    /// Runtime-native health probe test (`None` keeps the image default).
    pub healthcheck: Option<Vec<String>>,
    /// Hostname inside the container.
    pub hostname: Option<String>,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// Labels attached to the container.
    pub labels: BTreeMap<String, String>,
}

/// Result of a command executed inside a running container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code of the command.
    pub exit_code: i64,
    /// Combined stdout/stderr.
    pub output: String,
}

/// Runtime-native event shape, before translation into the session vocabulary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Object type (`container`, `network`, `image`, ...).
    pub typ: String,
    /// Action (`create`, `start`, `die`, ...).
    pub action: String,
    /// Affected object identity.
    pub id: Option<String>,
    /// Actor attributes (`exitCode`, `name`, labels, ...).
    pub attributes: BTreeMap<String, String>,
}

/// Operations the orchestrator needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Creates (but does not start) a container.
    async fn create(&self, req: &CreateRequest) -> Result<ContainerId, ContainerError>;

    /// Starts a created container.
    async fn start(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Asks a running container to terminate gracefully.
    async fn stop(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Terminates a container immediately.
    async fn kill(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Removes a container; `force` removes it even while running.
    async fn remove(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    /// Runs `command` inside the container as `user` and waits for it to exit.
    async fn exec(
        &self,
        id: &ContainerId,
        command: &[String],
        user: Option<&str>,
    ) -> Result<ExecOutput, ContainerError>;

    /// Follows the combined output of a container.
    fn logs(&self, id: &ContainerId) -> LogStream;

    /// Subscribes to lifecycle notifications.
    fn events(&self) -> RuntimeEventStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let long = ContainerId::new("0123456789abcdef0123");
        assert_eq!(long.short(), "0123456789ab");
        assert_eq!(long.to_string(), "0123456789ab");

        let short = ContainerId::new("abc");
        assert_eq!(short.short(), "abc");
        assert_eq!(short.as_str(), "abc");
    }
}
