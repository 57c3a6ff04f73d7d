//! # Run model: the named resources of one session.
//!
//! [`RunModel`] owns every [`Resource`] of a run together with the runtime
//! handle and the session configuration, and exposes:
//! - lookup and iteration (driver first, then services in insertion order)
//! - the dependency predicates used by the scheduler (`can_create`, `can_start`)
//! - pass-through operations by name (`create`, `start`, `stop`, ...)
//! - fan-out of container events to every resource holding that container
//!
//! ## Rules
//! - Names are unique; adding an existing name replaces the resource.
//! - `validate()` must pass before any operation is issued: a driver exists,
//!   every dependency resolves and the dependency graph is acyclic.

use std::collections::HashMap;

use tracing::{info, warn};

use super::resource::{Resource, Status};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::runtime::{ContainerId, RuntimeRef};
use crate::spec::{ResourceSpec, TestdriveDocument, drop_self_dependency};

/// Name of the resource whose exit code decides the run.
pub const DRIVER: &str = "driver";

/// Resources of one run, keyed by name.
pub struct RunModel {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    runtime: RuntimeRef,
    cfg: Config,
    session_id: String,
}

impl RunModel {
    /// Creates an empty model.
    pub fn new(runtime: RuntimeRef, cfg: Config, session_id: impl Into<String>) -> Self {
        Self {
            resources: Vec::new(),
            index: HashMap::new(),
            runtime,
            cfg,
            session_id: session_id.into(),
        }
    }

    /// Builds a model from a loaded document.
    pub fn from_document(
        doc: &TestdriveDocument,
        runtime: RuntimeRef,
        cfg: Config,
        session_id: impl Into<String>,
    ) -> Self {
        let mut model = Self::new(runtime, cfg, session_id);
        if let Some(driver) = doc.driver() {
            model.set_driver(driver.clone());
        }
        for (name, spec) in &doc.services {
            model.add_service(name.clone(), spec.clone());
        }
        model
    }

    /// Sets (or replaces) the driver.
    pub fn set_driver(&mut self, spec: ResourceSpec) {
        self.insert(DRIVER.to_string(), spec);
    }

    /// Adds (or replaces) a service.
    pub fn add_service(&mut self, name: impl Into<String>, spec: ResourceSpec) {
        let name = name.into();
        if name == DRIVER {
            warn!("service named {DRIVER:?} replaces the driver");
        }
        self.insert(name, spec);
    }

    fn insert(&mut self, name: String, mut spec: ResourceSpec) {
        drop_self_dependency(&name, &mut spec);
        match self.index.get(&name).copied() {
            Some(i) => {
                self.resources[i] = Resource::new(name, spec, &self.session_id, i);
            }
            None => {
                let seq = self.resources.len();
                self.index.insert(name.clone(), seq);
                self.resources
                    .push(Resource::new(name, spec, &self.session_id, seq));
            }
        }
    }

    #[inline]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the resource named `name`.
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.index.get(name).map(|&i| &self.resources[i])
    }

    /// Returns the driver, if set.
    pub fn driver(&self) -> Option<&Resource> {
        self.get(DRIVER)
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterates resources, driver first.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.driver()
            .into_iter()
            .chain(self.resources.iter().filter(|r| r.name() != DRIVER))
    }

    /// Names in iteration order.
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|r| r.name().to_string()).collect()
    }

    fn deps_ready(&self, r: &Resource) -> bool {
        r.dependencies()
            .iter()
            .all(|dep| self.get(dep).is_some_and(|d| d.status() == Status::Ready))
    }

    /// `New` and every dependency `Ready`.
    pub fn can_create(&self, r: &Resource) -> bool {
        r.status() == Status::New && self.deps_ready(r)
    }

    /// `Created` and every dependency `Ready`.
    pub fn can_start(&self, r: &Resource) -> bool {
        r.status() == Status::Created && self.deps_ready(r)
    }

    /// Checks that the model can be run.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.driver().is_none() {
            return Err(RuntimeError::NoDriver);
        }
        for r in &self.resources {
            if let Some(dep) = r.dependencies().iter().find(|d| self.get(d).is_none()) {
                return Err(RuntimeError::UnknownDependency {
                    resource: r.name().to_string(),
                    dependency: dep.clone(),
                });
            }
        }
        if let Some(path) = self.find_cycle() {
            return Err(RuntimeError::DependencyCycle { path });
        }
        Ok(())
    }

    /// Depth-first search for a dependency cycle; returns it closed (first == last).
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unseen,
            Open,
            Done,
        }

        fn visit(
            model: &RunModel,
            i: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<String>> {
            marks[i] = Mark::Open;
            stack.push(i);
            for dep in model.resources[i].dependencies() {
                let Some(&j) = model.index.get(dep) else {
                    continue;
                };
                match marks[j] {
                    Mark::Open => {
                        let from = stack.iter().position(|&k| k == j).unwrap_or(0);
                        let mut path: Vec<String> = stack[from..]
                            .iter()
                            .map(|&k| model.resources[k].name().to_string())
                            .collect();
                        path.push(model.resources[j].name().to_string());
                        return Some(path);
                    }
                    Mark::Unseen => {
                        if let Some(path) = visit(model, j, marks, stack) {
                            return Some(path);
                        }
                    }
                    Mark::Done => {}
                }
            }
            stack.pop();
            marks[i] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unseen; self.resources.len()];
        let mut stack = Vec::new();
        (0..self.resources.len()).find_map(|i| {
            if marks[i] == Mark::Unseen {
                visit(self, i, &mut marks, &mut stack)
            } else {
                None
            }
        })
    }

    fn slot(&mut self, name: &str) -> Option<&mut Resource> {
        let i = *self.index.get(name)?;
        self.resources.get_mut(i)
    }

    // ---- pass-through operations ----

    pub async fn create(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some(&i) = self.index.get(name) else {
            return Ok(());
        };
        self.resources[i].create(&self.runtime).await
    }

    pub async fn start(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some(&i) = self.index.get(name) else {
            return Ok(());
        };
        self.resources[i].start(&self.runtime).await
    }

    pub fn begin_healthcheck(&mut self, name: &str) {
        if let Some(r) = self.slot(name) {
            r.begin_healthcheck();
        }
    }

    pub async fn check(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some(&i) = self.index.get(name) else {
            return Ok(());
        };
        self.resources[i].check(&self.runtime).await
    }

    pub async fn stop(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some(&i) = self.index.get(name) else {
            return Ok(());
        };
        self.resources[i].stop(&self.runtime, &self.cfg).await
    }

    pub async fn kill(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some(&i) = self.index.get(name) else {
            return Ok(());
        };
        self.resources[i].kill(&self.runtime, &self.cfg).await
    }

    pub async fn remove(&mut self, name: &str) -> Result<(), RuntimeError> {
        let Some(&i) = self.index.get(name) else {
            return Ok(());
        };
        self.resources[i].remove(&self.runtime, &self.cfg).await
    }

    // ---- lifecycle events ----

    fn holding<'a>(&'a mut self, id: &'a ContainerId) -> impl Iterator<Item = &'a mut Resource> {
        self.resources
            .iter_mut()
            .filter(move |r| r.container() == Some(id))
    }

    pub fn on_created(&mut self, id: &ContainerId) {
        self.holding(id).for_each(Resource::on_created);
    }

    pub fn on_started(&mut self, id: &ContainerId) {
        self.holding(id).for_each(Resource::on_started);
    }

    pub fn on_stopping(&mut self, id: &ContainerId) {
        let cfg = self.cfg.clone();
        self.holding(id).for_each(|r| r.on_stopping(&cfg));
    }

    /// Returns the names of the resources that this event moved to `Stopped`.
    pub fn on_stopped(&mut self, id: &ContainerId, exit_code: Option<i32>) -> Vec<String> {
        self.holding(id)
            .filter_map(|r| r.on_stopped(exit_code).then(|| r.name().to_string()))
            .collect()
    }

    pub fn on_destroyed(&mut self, id: &ContainerId) {
        self.holding(id).for_each(Resource::on_destroyed);
    }

    /// Force-removes every container still held, ignoring failures.
    ///
    /// Used once the run is over, whatever its outcome.
    pub async fn teardown(&mut self) {
        for r in &self.resources {
            let Some(id) = r.container() else { continue };
            match self.runtime.remove(id, true).await {
                Ok(()) => {
                    info!(resource = %r.name(), container = %id, "removed leftover container");
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(resource = %r.name(), container = %id, error = %e, "cannot remove leftover container");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::runtime::MemoryRuntime;

    fn model() -> RunModel {
        RunModel::new(Arc::new(MemoryRuntime::new()), Config::default(), "s1")
    }

    #[test]
    fn test_driver_iterates_first() {
        let mut m = model();
        m.add_service("db", ResourceSpec::new("postgres"));
        m.add_service("cache", ResourceSpec::new("redis"));
        m.set_driver(ResourceSpec::new("tests"));

        assert_eq!(m.names(), vec!["driver", "db", "cache"]);
        assert_eq!(m.get("cache").unwrap().container_name(), "s1_cache_1");
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn test_validate_requires_driver() {
        let mut m = model();
        m.add_service("db", ResourceSpec::new("postgres"));
        assert!(matches!(m.validate(), Err(RuntimeError::NoDriver)));
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let mut m = model();
        m.set_driver(ResourceSpec::new("tests").depends_on("db"));
        match m.validate() {
            Err(RuntimeError::UnknownDependency {
                resource,
                dependency,
            }) => {
                assert_eq!(resource, "driver");
                assert_eq!(dependency, "db");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_validate_cycle() {
        let mut m = model();
        m.set_driver(ResourceSpec::new("tests").depends_on("a"));
        m.add_service("a", ResourceSpec::new("x").depends_on("b"));
        m.add_service("b", ResourceSpec::new("x").depends_on("a"));

        match m.validate() {
            Err(RuntimeError::DependencyCycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"a".to_string()));
                assert!(path.contains(&"b".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_dropped() {
        let mut m = model();
        m.set_driver(ResourceSpec::new("tests").depends_on("driver").depends_on("db"));
        m.add_service("db", ResourceSpec::new("postgres").depends_on("db"));

        assert!(m.validate().is_ok());
        assert!(m.get("db").unwrap().dependencies().is_empty());
        assert_eq!(m.driver().unwrap().dependencies(), ["db".to_string()]);
        assert!(m.can_create(m.get("db").unwrap()));
    }

    #[test]
    fn test_can_create_waits_for_dependencies() {
        let mut m = model();
        m.set_driver(ResourceSpec::new("tests").depends_on("db"));
        m.add_service("db", ResourceSpec::new("postgres"));

        assert!(!m.can_create(m.driver().unwrap()));
        assert!(m.can_create(m.get("db").unwrap()));
    }

    #[test]
    fn test_from_document() {
        let doc = TestdriveDocument::parse(
            "driver:\n  image: tests\n  depends_on: [db]\nservices:\n  db:\n    image: postgres\n",
        )
        .unwrap();
        let m = RunModel::from_document(&doc, Arc::new(MemoryRuntime::new()), Config::default(), "s9");
        assert_eq!(m.names(), vec!["driver", "db"]);
        assert_eq!(m.driver().unwrap().container_name(), "s9_driver_0");
        assert!(m.validate().is_ok());
    }
}
