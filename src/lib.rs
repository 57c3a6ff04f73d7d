//! # testdrive
//!
//! **testdrive** runs an integration test as a set of containers: one
//! **driver** (the test program) plus the **services** it needs. Services are
//! created, started and probed in dependency order; the driver runs once its
//! dependencies are ready; when the driver exits everything is stopped and
//! removed, and the driver's exit code becomes the result of the run.
//!
//! ## Architecture
//! ```text
//!   testdrive.yml ──► TestdriveDocument ──► RunModel (driver + services)
//!                                               │
//!     ┌──────────────┐  ┌─────────────────────┐ │  ┌────────────────┐
//!     │  EventTimer  │  │ RuntimeEventWatcher │ │  │ ShutdownHandle │
//!     │   (Tick)     │  │ (container events)  │ │  │ (signals, API) │
//!     └──────┬───────┘  └──────────┬──────────┘ │  └───────┬────────┘
//!            └─────────────────────┼────────────┼──────────┘
//!                                  ▼            │
//!                           EventQueue (FIFO)   │
//!                                  │            │
//!                                  ▼            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runner (single consumer, only mutator of resource state)         │
//! │   1. apply event      → Resource status / Phase                   │
//! │   2. action table     → Execution | Shutdown                      │
//! │   3. issue actions    → ContainerRuntime (create/start/exec/...)  │
//! │   empty action list   → Done                                      │
//! └──────────────────────────────────┬────────────────────────────────┘
//!                                    ▼
//!                ContainerRuntime (DockerRuntime | MemoryRuntime)
//! ```
//!
//! ### Resource lifecycle
//! ```text
//! New → CreateInProgress → Created → StartInProgress → Started
//!     → HealthcheckInProgress → Ready → StopInProgress → Stopped
//!     → DestroyInProgress → Destroyed
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types                                  |
//! |-------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Document**      | YAML description of the driver and its services.         | [`TestdriveDocument`], [`ResourceSpec`]    |
//! | **Scheduling**    | Dependency-ordered bring-up, bounded teardown.           | [`Runner`], [`RunModel`], [`Action`]       |
//! | **Sessions**      | Producers, runner and teardown wired together.           | [`Session`], [`ShutdownHandle`]            |
//! | **Runtimes**      | Docker backend and an in-memory backend.                 | [`ContainerRuntime`], [`DockerRuntime`]    |
//! | **Errors**        | Typed errors for runtime calls, runs and configuration.  | [`ContainerError`], [`RuntimeError`]       |
//! | **Configuration** | Timing knobs and the session id.                         | [`Config`]                                 |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use testdrive::{Config, MemoryRuntime, Session, TestdriveDocument};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc = TestdriveDocument::parse(
//!         "driver:\n  image: my-tests\n  depends_on: [db]\n\
//!          services:\n  db:\n    image: postgres:16\n",
//!     )?;
//!
//!     let runtime = Arc::new(MemoryRuntime::with_auto_events());
//!     runtime.exit_on_start("driver", 0);
//!
//!     let code = Session::new(Config::default(), runtime).run(&doc).await?;
//!     assert_eq!(code, 0);
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
pub mod events;
pub mod runtime;
pub mod sources;
pub mod spec;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{
    Action, DEFAULT_EXIT_CODE, DRIVER, Phase, Resource, RunModel, Runner, Session,
    ShutdownHandle, Status, actions_for_execution, actions_for_shutdown,
    wait_for_shutdown_signal,
};
pub use error::{ConfigError, ContainerError, RuntimeError};
pub use events::{Event, EventKind, EventQueue, EventSender};
pub use runtime::{
    ContainerId, ContainerRuntime, DockerRuntime, MemoryRuntime, RuntimeEvent, RuntimeRef,
};
pub use spec::{ReadyCheck, ResourceSpec, TestdriveDocument};
