//! Whole sessions against the in-memory runtime with automatic lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use testdrive::runtime::Op;
use testdrive::{
    Config, ContainerError, MemoryRuntime, RunModel, RuntimeError, Session, TestdriveDocument,
};

const DOC: &str = "\
driver:
  image: tests
  command: cargo test
  depends_on: [db, cache]
services:
  db:
    image: postgres:16
    readycheck:
      command: [pg_isready, -U, postgres]
      user: postgres
  cache:
    image: redis:7
";

fn cfg() -> Config {
    Config {
        session_id: Some("it".into()),
        ..Config::default()
    }
}

fn doc() -> TestdriveDocument {
    TestdriveDocument::parse(DOC).expect("valid document")
}

fn position(mem: &MemoryRuntime, resource: &str, op: Op) -> usize {
    mem.calls()
        .iter()
        .position(|c| c.resource == resource && c.op == op)
        .unwrap_or_else(|| panic!("{op:?} of {resource} never issued"))
}

#[tokio::test(start_paused = true)]
async fn session_returns_driver_exit_code_and_cleans_up() {
    let mem = Arc::new(MemoryRuntime::with_auto_events());
    mem.exit_on_start("driver", 0);
    mem.script_exec("db", [1, 0]);

    let code = Session::new(cfg(), mem.clone()).run(&doc()).await.unwrap();

    assert_eq!(code, 0);
    assert!(position(&mem, "db", Op::Exec) < position(&mem, "driver", Op::Create));
    assert!(position(&mem, "cache", Op::Start) < position(&mem, "driver", Op::Create));
    for resource in ["driver", "db", "cache"] {
        assert_eq!(mem.ops_for(resource).last(), Some(&Op::Remove), "{resource}");
    }
}

#[tokio::test(start_paused = true)]
async fn failing_driver_code_is_propagated() {
    let mem = Arc::new(MemoryRuntime::with_auto_events());
    mem.exit_on_start("driver", 3);

    let code = Session::new(cfg(), mem.clone()).run(&doc()).await.unwrap();
    assert_eq!(code, 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_handle_stops_a_running_session() {
    let mem = Arc::new(MemoryRuntime::with_auto_events());
    let session = Session::new(cfg(), mem.clone());
    let handle = session.shutdown_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.shutdown();
        handle.shutdown();
    });

    let code = session.run(&doc()).await.unwrap();
    assert_eq!(code, 143);
    assert!(mem.ops_for("driver").contains(&Op::Stop));
    for resource in ["driver", "db", "cache"] {
        assert_eq!(mem.ops_for(resource).last(), Some(&Op::Remove), "{resource}");
    }
}

#[tokio::test(start_paused = true)]
async fn fatal_error_still_removes_created_containers() {
    let mem = Arc::new(MemoryRuntime::with_auto_events());
    mem.fail_next(Op::Create, "driver", ContainerError::api("pull access denied"));

    let err = Session::new(cfg(), mem.clone()).run(&doc()).await.unwrap_err();

    match err {
        RuntimeError::Container { resource, op, .. } => {
            assert_eq!(resource, "driver");
            assert_eq!(op, "create");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(mem.ops_for("db").last(), Some(&Op::Remove));
    assert_eq!(mem.ops_for("cache").last(), Some(&Op::Remove));
}

#[tokio::test(start_paused = true)]
async fn dependency_cycle_is_rejected_before_any_call() {
    let mem = Arc::new(MemoryRuntime::with_auto_events());
    let doc = TestdriveDocument::parse(
        "driver:\n  image: t\n  depends_on: [a]\nservices:\n  a:\n    image: x\n    depends_on: [b]\n  b:\n    image: x\n    depends_on: [a]\n",
    )
    .unwrap();

    let err = Session::new(cfg(), mem.clone()).run(&doc).await.unwrap_err();
    assert!(matches!(err, RuntimeError::DependencyCycle { .. }));
    assert!(mem.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn model_without_driver_is_rejected() {
    let mem = Arc::new(MemoryRuntime::with_auto_events());
    let mut model = RunModel::new(mem.clone(), cfg(), "it");
    model.add_service("db", testdrive::ResourceSpec::new("postgres"));

    let err = Session::new(cfg(), mem.clone())
        .run_model(model)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NoDriver));
}

#[tokio::test(start_paused = true)]
async fn self_dependency_does_not_block_the_run() {
    let mem = Arc::new(MemoryRuntime::with_auto_events());
    mem.exit_on_start("driver", 0);
    let mut model = RunModel::new(mem.clone(), cfg(), "it");
    model.set_driver(testdrive::ResourceSpec::new("tests").depends_on("db"));
    model.add_service("db", testdrive::ResourceSpec::new("postgres").depends_on("db"));

    let code = Session::new(cfg(), mem.clone())
        .run_model(model)
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert!(position(&mem, "db", Op::Start) < position(&mem, "driver", Op::Create));
}
