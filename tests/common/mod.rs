//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use testdrive::{
    Config, ContainerId, Event, EventKind, MemoryRuntime, RunModel, Runner, Status,
    TestdriveDocument,
};

/// Builds a runner for `yaml` on top of `mem`.
pub fn runner(mem: &Arc<MemoryRuntime>, yaml: &str) -> Runner {
    let doc = TestdriveDocument::parse(yaml).expect("valid document");
    let model = RunModel::from_document(&doc, mem.clone(), Config::default(), "it");
    model.validate().expect("valid model");
    Runner::new(model)
}

/// Container id of `resource`; panics if it was never created.
pub fn id(mem: &MemoryRuntime, resource: &str) -> ContainerId {
    mem.id_of(resource)
        .unwrap_or_else(|| panic!("{resource} was never created"))
}

/// Feeds one event to the runner.
pub async fn feed(r: &mut Runner, kind: EventKind) {
    r.handle_event(&Event::new(kind))
        .await
        .expect("event handled");
}

pub async fn tick(r: &mut Runner) {
    feed(r, EventKind::Tick).await;
}

pub fn status(r: &Runner, resource: &str) -> Status {
    r.model().get(resource).expect("resource exists").status()
}
