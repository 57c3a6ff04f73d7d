//! # Declarative description of one driver or service.
//!
//! [`ResourceSpec`] is what the document declares for a resource: the image
//! to run and the optional command override, readiness probe, native health
//! probe and dependencies. The core treats it as read-only input.
//!
//! Commands accept either a YAML list or a single string that is split on
//! whitespace:
//! ```yaml
//! command: ["pg_isready", "-U", "postgres"]
//! command: pg_isready -U postgres
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// In-container command that decides whether a started resource is ready.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReadyCheck {
    /// Command executed with `exec`; exit code 0 means ready.
    #[serde(deserialize_with = "argv")]
    pub command: Vec<String>,
    /// User the command runs as (`None` = image default).
    #[serde(default)]
    pub user: Option<String>,
}

impl ReadyCheck {
    /// Creates a probe running `command` as the image's default user.
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            user: None,
        }
    }

    /// Runs the probe as `user`.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Declarative configuration of a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceSpec {
    /// Image reference.
    pub image: String,

    /// Command override.
    #[serde(default, deserialize_with = "opt_argv")]
    pub command: Option<Vec<String>>,

    /// Readiness probe, evaluated by the scheduler after start.
    #[serde(default)]
    pub readycheck: Option<ReadyCheck>,

    /// Runtime-native health probe test, passed through on create.
    #[serde(default, deserialize_with = "opt_argv")]
    pub healthcheck: Option<Vec<String>>,

    /// Names of resources that must be READY before this one is built.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Hostname inside the container.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl ResourceSpec {
    /// Creates a spec for `image` with everything else defaulted.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Overrides the image command.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Attaches a readiness probe.
    pub fn with_readycheck(mut self, check: ReadyCheck) -> Self {
        self.readycheck = Some(check);
        self
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Sets an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// Command line as written in the document.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Argv(Vec<String>),
    Shell(String),
}

impl From<CommandLine> for Vec<String> {
    fn from(line: CommandLine) -> Self {
        match line {
            CommandLine::Argv(argv) => argv,
            CommandLine::Shell(s) => s.split_whitespace().map(str::to_string).collect(),
        }
    }
}

fn argv<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    CommandLine::deserialize(d).map(Into::into)
}

fn opt_argv<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    Option::<CommandLine>::deserialize(d).map(|line| line.map(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_as_string_or_list() {
        let a: ResourceSpec = serde_yaml::from_str("image: alpine\ncommand: echo hi there").unwrap();
        let b: ResourceSpec =
            serde_yaml::from_str("image: alpine\ncommand: [echo, hi, there]").unwrap();
        assert_eq!(a.command, b.command);
        assert_eq!(
            a.command.as_deref(),
            Some(&["echo".to_string(), "hi".to_string(), "there".to_string()][..])
        );
    }

    #[test]
    fn test_defaults() {
        let spec: ResourceSpec = serde_yaml::from_str("image: postgres:16").unwrap();
        assert_eq!(spec, ResourceSpec::new("postgres:16"));
        assert!(spec.readycheck.is_none());
        assert!(spec.depends_on.is_empty());
    }

    #[test]
    fn test_readycheck_with_user() {
        let spec: ResourceSpec = serde_yaml::from_str(
            "image: postgres\nreadycheck:\n  command: pg_isready -U postgres\n  user: postgres\n",
        )
        .unwrap();
        assert_eq!(
            spec.readycheck,
            Some(ReadyCheck::new(["pg_isready", "-U", "postgres"]).with_user("postgres"))
        );
    }
}
