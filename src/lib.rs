// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod shell;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate, load_or_default, validate_speed};
use crate::engine::{Simulation, spawn_executor};
use crate::shell::{CommandExecutor, OutputSink, run_repl};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the simulation and its owning executor task
/// - the interactive shell on stdin/stdout
/// - Ctrl-C handling
/// - shutdown of every node process on the way out
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;
    info!(
        node_exe = %cfg.simulation.node_exe.display(),
        speed = cfg.simulation.speed,
        "starting simulation"
    );

    let cancel = CancellationToken::new();
    let sim = Simulation::new(&cfg, cancel.child_token());
    let (proxy, executor) = spawn_executor(sim, cfg.simulation.work_queue_length, cancel.clone());

    // Ctrl-C → cancel every wait and stop the executor.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; shutting down");
            cancel.cancel();
        });
    }

    let output = OutputSink::stdout();
    let commands = CommandExecutor::new(proxy.clone(), output.clone(), cancel.clone());
    let input = BufReader::new(tokio::io::stdin());
    let shell_res = run_repl(&commands, input, &output, &cancel).await;

    // Ask nodes to exit while waits are still possible.
    if !cancel.is_cancelled() {
        let stopped = proxy
            .call(|sim| Box::pin(async move { sim.shutdown().await }))
            .await;
        if let Err(e) = stopped {
            warn!(error = %e, "simulation shutdown failed");
        }
        cancel.cancel();
    }
    drop(commands);
    drop(proxy);

    let mut sim = executor.await.context("simulation executor panicked")?;
    sim.shutdown().await;

    shell_res.context("interactive shell failed")
}

/// Load the config file and apply CLI overrides.
///
/// An explicit `--config` must exist; the implicit default path is optional.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut cfg = match &args.config {
        Some(path) => load_and_validate(PathBuf::from(path))
            .with_context(|| format!("loading config '{path}'"))?,
        None => load_or_default(default_config_path()).context("loading default config")?,
    };

    if let Some(exe) = &args.node_exe {
        cfg.simulation.node_exe = PathBuf::from(exe);
    }
    if let Some(speed) = args.speed {
        validate_speed(speed)?;
        cfg.simulation.speed = speed;
    }
    Ok(cfg)
}
