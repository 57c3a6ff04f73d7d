//! Error types used by the testdrive runtime.
//!
//! This module defines three error enums:
//!
//! - [`ContainerError`] — failures reported by the container runtime collaborator.
//! - [`RuntimeError`] — fatal errors that abort a test session.
//! - [`ConfigError`] — errors raised while loading the declarative document.
//!
//! Every type provides `as_label` for logs. [`ContainerError`] additionally
//! classifies itself (`is_not_found`, `is_conflict`) so resources can absorb
//! the recoverable cases at their own boundary.

use std::path::PathBuf;
use thiserror::Error;

/// # Errors reported by a container runtime.
///
/// "Not found" and "conflict" are kept distinguishable from every other
/// failure: resources treat the first as "already gone" and swallow the second
/// where the operation is idempotent.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// The container (or exec instance) does not exist.
    #[error("container not found: {id}")]
    NotFound {
        /// Container identity the call was issued for.
        id: String,
    },

    /// The container is already in the requested state (e.g. removal in progress).
    #[error("conflict on container {id}: {message}")]
    Conflict {
        /// Container identity the call was issued for.
        id: String,
        /// Message returned by the runtime.
        message: String,
    },

    /// Any other API failure.
    #[error("runtime api error (status={status:?}): {message}")]
    Api {
        /// HTTP-like status code, if the runtime reported one.
        status: Option<u16>,
        /// Message returned by the runtime.
        message: String,
    },

    /// The runtime's event or output stream failed.
    #[error("runtime stream failed: {message}")]
    Stream {
        /// Underlying failure.
        message: String,
    },
}

impl ContainerError {
    /// Creates an [`ContainerError::Api`] error without status code.
    pub fn api(message: impl Into<String>) -> Self {
        ContainerError::Api {
            status: None,
            message: message.into(),
        }
    }

    /// Returns `true` for [`ContainerError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound { .. })
    }

    /// Returns `true` for [`ContainerError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, ContainerError::Conflict { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use testdrive::ContainerError;
    ///
    /// let err = ContainerError::NotFound { id: "abc".into() };
    /// assert_eq!(err.as_label(), "container_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ContainerError::NotFound { .. } => "container_not_found",
            ContainerError::Conflict { .. } => "container_conflict",
            ContainerError::Api { .. } => "container_api",
            ContainerError::Stream { .. } => "container_stream",
        }
    }
}

/// # Fatal errors produced by a test session.
///
/// Any of these aborts the run. The session still makes a best-effort attempt
/// to remove every container that was created before the error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The run model has no resource named `driver`.
    #[error("no driver configured")]
    NoDriver,

    /// A resource depends on a name that is not in the run model.
    #[error("resource {resource:?} depends on unknown resource {dependency:?}")]
    UnknownDependency {
        /// Resource declaring the dependency.
        resource: String,
        /// Name that did not resolve.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// Resource names along the cycle; first and last are equal.
        path: Vec<String>,
    },

    /// A runtime call failed in a way that cannot be absorbed.
    #[error("{op} of {resource:?} failed: {source}")]
    Container {
        /// Resource the call was issued for.
        resource: String,
        /// Operation name (`create`, `start`, ...).
        op: &'static str,
        /// Underlying runtime error.
        #[source]
        source: ContainerError,
    },

    /// The event queue closed while the run was still in progress.
    #[error("event stream closed before the run finished")]
    EventStreamClosed,

    /// The run finished without capturing the driver's exit code.
    #[error("run finished without a driver exit code")]
    NoExitCode,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::NoDriver => "runtime_no_driver",
            RuntimeError::UnknownDependency { .. } => "runtime_unknown_dependency",
            RuntimeError::DependencyCycle { .. } => "runtime_dependency_cycle",
            RuntimeError::Container { .. } => "runtime_container",
            RuntimeError::EventStreamClosed => "runtime_event_stream_closed",
            RuntimeError::NoExitCode => "runtime_no_exit_code",
        }
    }

    pub(crate) fn container(resource: &str, op: &'static str, source: ContainerError) -> Self {
        RuntimeError::Container {
            resource: resource.to_string(),
            op,
            source,
        }
    }
}

/// # Errors raised while loading a testdrive document.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for the document schema.
    #[error("invalid document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document parsed but violates a structural rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Yaml(_) => "config_yaml",
            ConfigError::Invalid(_) => "config_invalid",
        }
    }
}
