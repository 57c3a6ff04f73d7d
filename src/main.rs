//! testdrive - run an integration test driver and its services in containers.
//!
//! # Usage
//!
//! ```bash
//! # Run ./testdrive.yml against the local Docker daemon
//! testdrive
//!
//! # Another document, verbose progress, shorter graceful stop window
//! testdrive -f ci/testdrive.yml -v --stop-timeout 5
//!
//! # Walk the schedule without touching Docker
//! testdrive --dry-run
//! ```
//!
//! The process exits with the driver's exit code, or 127 if the run could
//! not be completed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use testdrive::{
    Config, DEFAULT_EXIT_CODE, DRIVER, DockerRuntime, MemoryRuntime, RuntimeRef, Session,
    TestdriveDocument,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(
    name = "testdrive",
    about = "Run an integration test driver and the services it depends on",
    version
)]
struct Cli {
    /// Path to the testdrive document.
    #[arg(short, long, value_name = "FILE", default_value = "testdrive.yml")]
    file: PathBuf,

    /// Log scheduling progress (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Seconds a container may take to stop before it is killed.
    #[arg(long, value_name = "SECS")]
    stop_timeout: Option<u64>,

    /// Session id (container name prefix and label value).
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,

    /// Use the in-memory runtime; the driver exits with 0 as soon as it starts.
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let doc = TestdriveDocument::from_path(&cli.file)
        .with_context(|| format!("loading {}", cli.file.display()))?;

    let mut cfg = Config::default();
    if let Some(secs) = cli.stop_timeout {
        cfg.stop_timeout = Duration::from_secs(secs);
    }
    let session_id = Config {
        session_id: cli.session_id,
        ..Config::default()
    }
    .resolve_session_id();
    cfg.session_id = Some(session_id.clone());

    let runtime: RuntimeRef = if cli.dry_run {
        let memory = MemoryRuntime::with_auto_events();
        memory.exit_on_start(DRIVER, 0);
        Arc::new(memory)
    } else {
        let docker = DockerRuntime::connect()
            .await
            .context("connecting to the docker daemon")?;
        Arc::new(docker.with_session(&session_id))
    };

    info!(session = %session_id, file = %cli.file.display(), services = doc.services.len(), "starting");
    let code = Session::new(cfg, runtime)
        .with_os_signals(true)
        .run(&doc)
        .await?;
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => {
            info!(exit_code = code, "driver finished");
            code
        }
        Err(e) => {
            error!("testdrive failed: {e:#}");
            DEFAULT_EXIT_CODE
        }
    };
    ExitCode::from(code.clamp(0, 255) as u8)
}
