//! In-memory runtime for dry runs and tests.
//!
//! [`MemoryRuntime`] records every call (by resource name), answers with
//! scripted results and, when auto events are enabled, emits the lifecycle
//! notifications a real daemon would send. Nothing is executed.
//!
//! ```text
//! create  ─► "create"
//! start   ─► "start"   (+ "die" if exit_on_start was scripted)
//! stop    ─► "kill", "die" exitCode=143
//! kill    ─► "kill", "die" exitCode=137
//! remove  ─► "destroy"
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream;

use super::docker::RESOURCE_LABEL;
use super::{
    ContainerId, ContainerRuntime, CreateRequest, ExecOutput, LogStream, RuntimeEvent,
    RuntimeEventStream,
};
use crate::error::ContainerError;

/// Runtime operation, used to script failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Start,
    Stop,
    Kill,
    Remove,
    Exec,
}

/// Recorded runtime call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    /// Operation issued.
    pub op: Op,
    /// Resource the container belongs to.
    pub resource: String,
}

#[derive(Default)]
struct State {
    next_id: u64,
    /// container id → resource name
    owners: HashMap<String, String>,
    calls: Vec<Call>,
    exec_codes: HashMap<String, VecDeque<i64>>,
    failures: HashMap<(Op, String), VecDeque<ContainerError>>,
    exit_on_start: HashMap<String, i32>,
    logs: HashMap<String, Vec<String>>,
    subscribers: Vec<mpsc::UnboundedSender<Result<RuntimeEvent, ContainerError>>>,
}

/// Container runtime that keeps everything in memory.
#[derive(Default)]
pub struct MemoryRuntime {
    auto_events: bool,
    state: Mutex<State>,
}

impl MemoryRuntime {
    /// Creates a runtime that emits no events on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runtime that emits the lifecycle events of every call.
    pub fn with_auto_events() -> Self {
        Self {
            auto_events: true,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts the exit codes returned by successive probes of `resource`.
    ///
    /// Once the script is exhausted, probes return 0.
    pub fn script_exec(&self, resource: &str, codes: impl IntoIterator<Item = i64>) {
        self.state()
            .exec_codes
            .entry(resource.to_string())
            .or_default()
            .extend(codes);
    }

    /// Makes the next `op` on `resource` fail with `err`.
    pub fn fail_next(&self, op: Op, resource: &str, err: ContainerError) {
        self.state()
            .failures
            .entry((op, resource.to_string()))
            .or_default()
            .push_back(err);
    }

    /// Makes `resource`'s container terminate with `code` right after it starts.
    pub fn exit_on_start(&self, resource: &str, code: i32) {
        self.state()
            .exit_on_start
            .insert(resource.to_string(), code);
    }

    /// Sets the output lines returned by `logs` for `resource`.
    pub fn script_logs(&self, resource: &str, lines: impl IntoIterator<Item = String>) {
        self.state()
            .logs
            .insert(resource.to_string(), lines.into_iter().collect());
    }

    /// Returns every call issued so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Returns the operations issued for `resource`, in order.
    pub fn ops_for(&self, resource: &str) -> Vec<Op> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.resource == resource)
            .map(|c| c.op)
            .collect()
    }

    /// Returns the container id assigned to `resource`, if created.
    pub fn id_of(&self, resource: &str) -> Option<ContainerId> {
        self.state()
            .owners
            .iter()
            .find(|(_, owner)| owner.as_str() == resource)
            .map(|(id, _)| ContainerId::new(id.clone()))
    }

    /// Emits a runtime event to every subscriber.
    pub fn emit(&self, event: RuntimeEvent) {
        let mut state = self.state();
        state
            .subscribers
            .retain(|tx| tx.unbounded_send(Ok(event.clone())).is_ok());
    }

    /// Ends every open event stream, as a daemon restart would.
    pub fn close_subscribers(&self) {
        self.state().subscribers.clear();
    }

    /// Emits a container event with `action` for `resource`'s container.
    pub fn emit_action(&self, resource: &str, action: &str, exit_code: Option<i32>) {
        let Some(id) = self.id_of(resource) else {
            return;
        };
        let mut attributes = BTreeMap::new();
        if let Some(code) = exit_code {
            attributes.insert("exitCode".to_string(), code.to_string());
        }
        self.emit(RuntimeEvent {
            typ: "container".to_string(),
            action: action.to_string(),
            id: Some(id.as_str().to_string()),
            attributes,
        });
    }

    /// Records `op` for the owner of `id` and pops a scripted failure, if any.
    fn record(&self, op: Op, id: &ContainerId) -> Result<String, ContainerError> {
        let mut state = self.state();
        let Some(resource) = state.owners.get(id.as_str()).cloned() else {
            return Err(ContainerError::NotFound {
                id: id.as_str().to_string(),
            });
        };
        state.calls.push(Call {
            op,
            resource: resource.clone(),
        });
        match pop_failure(&mut state, op, &resource) {
            Some(err) => Err(err),
            None => Ok(resource),
        }
    }

    fn auto(&self, resource: &str, action: &str, exit_code: Option<i32>) {
        if self.auto_events {
            self.emit_action(resource, action, exit_code);
        }
    }
}

fn pop_failure(state: &mut State, op: Op, resource: &str) -> Option<ContainerError> {
    state
        .failures
        .get_mut(&(op, resource.to_string()))
        .and_then(VecDeque::pop_front)
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn create(&self, req: &CreateRequest) -> Result<ContainerId, ContainerError> {
        let resource = req
            .labels
            .get(RESOURCE_LABEL)
            .cloned()
            .unwrap_or_else(|| req.name.clone());
        let id = {
            let mut state = self.state();
            state.calls.push(Call {
                op: Op::Create,
                resource: resource.clone(),
            });
            if let Some(err) = pop_failure(&mut state, Op::Create, &resource) {
                return Err(err);
            }
            state.next_id += 1;
            let id = format!("mem{:012}", state.next_id);
            state.owners.insert(id.clone(), resource.clone());
            id
        };
        self.auto(&resource, "create", None);
        Ok(ContainerId::new(id))
    }

    async fn start(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let resource = self.record(Op::Start, id)?;
        self.auto(&resource, "start", None);
        let exit = self.state().exit_on_start.get(&resource).copied();
        if let Some(code) = exit {
            self.auto(&resource, "die", Some(code));
        }
        Ok(())
    }

    async fn stop(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let resource = self.record(Op::Stop, id)?;
        self.auto(&resource, "kill", None);
        self.auto(&resource, "die", Some(143));
        Ok(())
    }

    async fn kill(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let resource = self.record(Op::Kill, id)?;
        self.auto(&resource, "kill", None);
        self.auto(&resource, "die", Some(137));
        Ok(())
    }

    async fn remove(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        let resource = self.record(Op::Remove, id)?;
        self.auto(&resource, "destroy", None);
        Ok(())
    }

    async fn exec(
        &self,
        id: &ContainerId,
        _command: &[String],
        _user: Option<&str>,
    ) -> Result<ExecOutput, ContainerError> {
        let resource = self.record(Op::Exec, id)?;
        let exit_code = self
            .state()
            .exec_codes
            .get_mut(&resource)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0);
        Ok(ExecOutput {
            exit_code,
            output: String::new(),
        })
    }

    fn logs(&self, id: &ContainerId) -> LogStream {
        let state = self.state();
        let lines = state
            .owners
            .get(id.as_str())
            .and_then(|resource| state.logs.get(resource))
            .cloned()
            .unwrap_or_default();
        stream::iter(lines.into_iter().map(Ok)).boxed()
    }

    fn events(&self) -> RuntimeEventStream {
        let (tx, rx) = mpsc::unbounded();
        self.state().subscribers.push(tx);
        rx.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(resource: &str) -> CreateRequest {
        let mut req = CreateRequest {
            name: format!("s_{resource}_0"),
            image: "alpine".into(),
            ..CreateRequest::default()
        };
        req.labels
            .insert(RESOURCE_LABEL.to_string(), resource.to_string());
        req
    }

    #[tokio::test]
    async fn test_records_calls_by_resource() {
        let rt = MemoryRuntime::new();
        let id = rt.create(&request("db")).await.unwrap();
        rt.start(&id).await.unwrap();
        rt.remove(&id, true).await.unwrap();

        assert_eq!(rt.ops_for("db"), vec![Op::Create, Op::Start, Op::Remove]);
        assert_eq!(rt.id_of("db"), Some(id));
    }

    #[tokio::test]
    async fn test_scripted_failure_is_consumed_once() {
        let rt = MemoryRuntime::new();
        let id = rt.create(&request("db")).await.unwrap();
        rt.fail_next(Op::Remove, "db", ContainerError::NotFound { id: "x".into() });

        assert!(rt.remove(&id, true).await.unwrap_err().is_not_found());
        assert!(rt.remove(&id, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_auto_events_reach_subscriber() {
        let rt = MemoryRuntime::with_auto_events();
        let mut events = rt.events();
        let id = rt.create(&request("db")).await.unwrap();
        rt.stop(&id).await.unwrap();

        let mut actions = Vec::new();
        for _ in 0..3 {
            let ev = events.next().await.unwrap().unwrap();
            actions.push(ev.action);
        }
        assert_eq!(actions, vec!["create", "kill", "die"]);
    }

    #[tokio::test]
    async fn test_exec_script_then_default() {
        let rt = MemoryRuntime::new();
        let id = rt.create(&request("db")).await.unwrap();
        rt.script_exec("db", [2]);

        assert_eq!(rt.exec(&id, &[], None).await.unwrap().exit_code, 2);
        assert_eq!(rt.exec(&id, &[], None).await.unwrap().exit_code, 0);
    }
}
