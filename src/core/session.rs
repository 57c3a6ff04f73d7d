//! # Session: wires producers, the runner and teardown for one test run.
//!
//! ## High-level architecture
//! ```text
//! Session::run(doc)
//!   │
//!   ├─ RunModel::from_document(doc, runtime, cfg, session_id)
//!   │
//!   ├─ producers (child tokens of the session token):
//!   │     EventTimer          ── Tick every cfg.tick()          ──┐
//!   │     RuntimeEventWatcher ── container lifecycle events      ──┼──► EventQueue
//!   │     forward_signals     ── SIGINT/SIGTERM → shutdown()     ──┤
//!   │     ShutdownHandle      ── caller-initiated shutdown()     ──┘
//!   │
//!   ├─ initial Tick, then Runner::run(queue)  ──►  Ok(driver exit code) | Err
//!   │
//!   ├─ token.cancel()   → producers stop
//!   └─ model.teardown() → force-remove every container still held
//! ```
//!
//! ## Rules
//! - The watcher subscribes before the first runtime call is issued.
//! - Teardown runs whatever the outcome of the runner.
//! - OS signal forwarding is opt-in (`with_os_signals`), so embedding callers
//!   keep control of their own signal handling.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::model::RunModel;
use super::runner::Runner;
use super::shutdown::{ShutdownHandle, forward_signals};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::{EventKind, EventQueue};
use crate::runtime::RuntimeRef;
use crate::sources::{EventTimer, RuntimeEventWatcher};
use crate::spec::TestdriveDocument;

/// One test session: a driver, its services and the machinery that runs them.
pub struct Session {
    cfg: Config,
    runtime: RuntimeRef,
    session_id: String,
    queue: EventQueue,
    os_signals: bool,
}

impl Session {
    /// Creates a session; the id comes from `cfg` or is generated.
    pub fn new(cfg: Config, runtime: RuntimeRef) -> Self {
        let session_id = cfg.resolve_session_id();
        Self {
            cfg,
            runtime,
            session_id,
            queue: EventQueue::new(),
            os_signals: false,
        }
    }

    /// Turns termination signals into shutdown requests while the session runs.
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    #[inline]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns a handle that requests shutdown of this session.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.queue.sender())
    }

    /// Runs the resources declared by `doc`.
    pub async fn run(self, doc: &TestdriveDocument) -> Result<i32, RuntimeError> {
        let model = RunModel::from_document(
            doc,
            self.runtime.clone(),
            self.cfg.clone(),
            self.session_id.clone(),
        );
        self.run_model(model).await
    }

    /// Runs an already built model and returns the driver's exit code.
    pub async fn run_model(mut self, model: RunModel) -> Result<i32, RuntimeError> {
        let token = CancellationToken::new();
        let tx = self.queue.sender();

        RuntimeEventWatcher::new(self.runtime.clone(), tx.clone()).spawn(token.child_token());
        EventTimer::new(tx.clone(), self.cfg.tick()).spawn(token.child_token());
        if self.os_signals {
            forward_signals(self.shutdown_handle(), token.child_token());
        }

        info!(session = %self.session_id, "session started");
        tx.publish(EventKind::Tick);

        let mut runner = Runner::new(model);
        let result = runner.run(&mut self.queue, self.cfg.poll()).await;
        token.cancel();

        if let Err(e) = &result {
            warn!(session = %self.session_id, error = %e, label = e.as_label(), "run aborted");
        }
        runner.model_mut().teardown().await;
        info!(session = %self.session_id, "session finished");
        result
    }
}
