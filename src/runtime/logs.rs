//! # LogForwarder — container output printer
//!
//! Follows the combined stdout/stderr of one container and re-emits every line
//! as a `tracing` event on target `testdrive::container`, tagged with the
//! resource name. Runs on its own task; never blocks the runner.
//!
//! ## Example output
//! ```text
//! 2024-05-01T10:00:01Z  INFO testdrive::container: resource="db" database system is ready
//! 2024-05-01T10:00:03Z  INFO testdrive::container: resource="driver" 12 tests passed
//! ```

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ContainerId, LogStream, RuntimeRef};
use crate::error::ContainerError;

/// Spawns per-container log followers.
pub struct LogForwarder;

impl LogForwarder {
    /// Starts following `id`'s output on a background task.
    ///
    /// The task ends when the runtime closes the stream (container gone) or on
    /// the first stream error.
    pub fn spawn(runtime: &RuntimeRef, resource: &str, id: &ContainerId) -> JoinHandle<()> {
        let mut lines = runtime.logs(id);
        let resource = resource.to_string();

        tokio::spawn(async move {
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) => {
                        info!(target: "testdrive::container", resource = %resource, "{line}");
                    }
                    Err(e) => {
                        debug!(resource = %resource, error = %e, "log stream ended with error");
                        break;
                    }
                }
            }
        })
    }
}

/// Carry-over buffer turning arbitrary output chunks into whole lines.
#[derive(Debug, Default)]
struct LineBuffer {
    carry: String,
}

impl LineBuffer {
    /// Appends `chunk` and returns every line it completed.
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.carry.push_str(chunk);
        let Some(end) = self.carry.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.carry.split_off(end + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        complete
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect()
    }

    /// Returns the unterminated tail, if any.
    fn finish(self) -> Option<String> {
        (!self.carry.is_empty()).then(|| self.carry.trim_end_matches('\r').to_string())
    }
}

/// Re-chunks raw output into lines; a line split across chunks is emitted once.
pub(crate) fn split_lines(
    chunks: BoxStream<'static, Result<String, ContainerError>>,
) -> LogStream {
    stream::unfold(Some((chunks, LineBuffer::default())), |state| async move {
        let (mut chunks, mut buf) = state?;
        match chunks.next().await {
            Some(Ok(chunk)) => {
                let lines = buf.push(&chunk).into_iter().map(Ok).collect::<Vec<_>>();
                Some((lines, Some((chunks, buf))))
            }
            Some(Err(e)) => {
                let mut lines = buf.finish().into_iter().map(Ok).collect::<Vec<_>>();
                lines.push(Err(e));
                Some((lines, None))
            }
            None => buf.finish().map(|tail| (vec![Ok(tail)], None)),
        }
    })
    .flat_map(stream::iter)
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::{Layer, registry};

    use super::*;
    use crate::runtime::docker::RESOURCE_LABEL;
    use crate::runtime::{ContainerRuntime, CreateRequest, MemoryRuntime};

    /// (resource, message) of every container line seen.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(String, String)>>>);

    #[derive(Default)]
    struct Fields {
        resource: String,
        message: String,
    }

    impl Visit for Fields {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            match field.name() {
                "resource" => self.resource = format!("{value:?}"),
                "message" => self.message = format!("{value:?}"),
                _ => {}
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().target() != "testdrive::container" {
                return;
            }
            let mut fields = Fields::default();
            event.record(&mut fields);
            self.0.lock().unwrap().push((fields.resource, fields.message));
        }
    }

    async fn created(mem: &MemoryRuntime, resource: &str) -> ContainerId {
        let req = CreateRequest {
            name: format!("s_{resource}_0"),
            image: "alpine".into(),
            labels: BTreeMap::from([(RESOURCE_LABEL.to_string(), resource.to_string())]),
            ..CreateRequest::default()
        };
        mem.create(&req).await.unwrap()
    }

    #[tokio::test]
    async fn test_forwards_each_line_tagged_with_resource() {
        let captured = Captured::default();
        let _guard = tracing::subscriber::set_default(registry().with(captured.clone()));

        let mem = Arc::new(MemoryRuntime::new());
        let id = created(&mem, "db").await;
        mem.script_logs("db", ["starting".to_string(), "ready to accept".to_string()]);
        let runtime: RuntimeRef = mem;

        LogForwarder::spawn(&runtime, "db", &id).await.unwrap();

        assert_eq!(
            *captured.0.lock().unwrap(),
            vec![
                ("db".to_string(), "starting".to_string()),
                ("db".to_string(), "ready to accept".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ends_on_empty_stream() {
        let mem = Arc::new(MemoryRuntime::new());
        let id = created(&mem, "cache").await;
        let runtime: RuntimeRef = mem;

        LogForwarder::spawn(&runtime, "cache", &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_split_lines_joins_partial_chunks() {
        let chunks = stream::iter(
            ["hel", "lo\nwor", "ld\r\n\n", "tail"].map(|c| Ok::<_, ContainerError>(c.to_string())),
        )
        .boxed();

        let lines: Vec<String> = split_lines(chunks)
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["hello", "world", "", "tail"]);
    }

    #[tokio::test]
    async fn test_split_lines_flushes_tail_before_error() {
        let chunks = stream::iter(vec![
            Ok("partial".to_string()),
            Err(ContainerError::Stream {
                message: "gone".into(),
            }),
        ])
        .boxed();

        let items: Vec<_> = split_lines(chunks).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }
}
