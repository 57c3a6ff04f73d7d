//! # Declarative input: resource specs and the document that holds them.
//!
//! - [`ResourceSpec`] - image, command, probes and dependencies of one resource
//! - [`ReadyCheck`] - in-container readiness probe
//! - [`TestdriveDocument`] - YAML document naming the driver and its services

mod document;
mod resource;

pub(crate) use document::drop_self_dependency;
pub use document::TestdriveDocument;
pub use resource::{ReadyCheck, ResourceSpec};
