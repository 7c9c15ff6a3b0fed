//! Demonstration binary: loads configuration, brings up the global core,
//! and runs a small programmatically-built task group end to end.
//!
//! This stands in for the full workflow-authoring front end, which is out
//! of scope for this crate: its job is to prove the engine wires together,
//! not to be a general task-definition surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use sloth_runner_core::agent::AgentClient;
use sloth_runner_core::core::initialize_global_core;
use sloth_runner_core::domain::models::{Task, TaskGroup, WorkdirPolicy};
use sloth_runner_core::domain::ports::{ClosureTaskBody, TaskOutput};
use sloth_runner_core::infrastructure::config::ConfigLoader;
use sloth_runner_core::infrastructure::logging;
use sloth_runner_core::runner::TaskRunner;

#[derive(Parser)]
#[command(name = "sloth-runner-core")]
#[command(about = "Sloth-Runner core engine demonstration", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a `sloth-runner.yaml` configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the worker pool size from the loaded configuration.
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path).context("failed to load configuration file")?,
        None => ConfigLoader::load().context("failed to load configuration")?,
    };
    if let Some(workers) = cli.workers {
        config.worker_pool.workers = workers;
    }

    logging::init(&config.logging).context("failed to initialize logging")?;

    let core = initialize_global_core(config);
    let agent_client = AgentClient::new(None);
    let runner = TaskRunner::new(core, agent_client);

    let workdir = std::env::temp_dir().join("sloth-runner-core-demo");
    let group = TaskGroup::new("demo", WorkdirPolicy::CreateFresh(workdir)).with_tasks(vec![
        Task::new(
            "fetch",
            Arc::new(ClosureTaskBody::new(|_ctx| Ok(TaskOutput::changed().with_detail("fetched", "input.tar.gz")))),
        ),
        Task::new(
            "build",
            Arc::new(ClosureTaskBody::new(|_ctx| Ok(TaskOutput::changed().with_detail("artifact", "app.bin")))),
        )
        .with_dependencies(["fetch"]),
        Task::new("deploy", Arc::new(ClosureTaskBody::new(|_ctx| Ok(TaskOutput::changed().with_detail("deployed", true)))))
            .with_dependencies(["build"]),
    ]);

    let summary = runner.run(&[group], &[]).await.context("run failed before completion")?;
    println!("{}", summary.table);

    if let Some(error) = summary.error {
        eprintln!("run failed: {}", error.message);
        std::process::exit(1);
    }

    Ok(())
}
