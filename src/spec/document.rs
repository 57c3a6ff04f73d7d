//! # Testdrive document loading.
//!
//! A document names one driver and any number of services:
//! ```yaml
//! driver:
//!   image: my-tests:latest
//!   depends_on: [db]
//! services:
//!   db:
//!     image: postgres:16
//!     readycheck:
//!       command: pg_isready -U postgres
//!       user: postgres
//! ```
//!
//! Loading validates the structure before the core sees it:
//! - a driver is present and no service is named `driver`
//! - self dependencies are dropped
//! - every dependency names a declared resource

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::resource::ResourceSpec;
use crate::core::DRIVER;
use crate::error::ConfigError;

/// Parsed and validated testdrive document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TestdriveDocument {
    /// Optional schema version string (informational).
    #[serde(default)]
    pub version: Option<String>,
    /// The test driver.
    #[serde(default)]
    pub driver: Option<ResourceSpec>,
    /// Named services.
    #[serde(default)]
    pub services: BTreeMap<String, ResourceSpec>,
}

impl TestdriveDocument {
    /// Reads and validates the document at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses and validates a document from YAML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut doc: TestdriveDocument = serde_yaml::from_str(text)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Returns the driver spec.
    pub fn driver(&self) -> Option<&ResourceSpec> {
        self.driver.as_ref()
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.driver.is_none() {
            return Err(ConfigError::Invalid("no driver declared".into()));
        }
        if self.services.contains_key(DRIVER) {
            return Err(ConfigError::Invalid(format!(
                "service name {DRIVER:?} is reserved"
            )));
        }

        if let Some(driver) = self.driver.as_mut() {
            drop_self_dependency(DRIVER, driver);
        }
        for (name, spec) in self.services.iter_mut() {
            drop_self_dependency(name, spec);
        }

        let known = |dep: &str| dep == DRIVER || self.services.contains_key(dep);
        let declared = self
            .driver
            .iter()
            .map(|spec| (DRIVER, spec))
            .chain(self.services.iter().map(|(n, s)| (n.as_str(), s)));
        for (name, spec) in declared {
            if let Some(dep) = spec.depends_on.iter().find(|dep| !known(dep)) {
                return Err(ConfigError::Invalid(format!(
                    "{name:?} depends on unknown resource {dep:?}"
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn drop_self_dependency(name: &str, spec: &mut ResourceSpec) {
    let before = spec.depends_on.len();
    spec.depends_on.retain(|dep| dep != name);
    if spec.depends_on.len() != before {
        debug!(resource = %name, "removed self dependency");
    }
}
