//! capscaled — the capscale daemon.
//!
//! Loads a `capscale.toml` policy and drives the capacity control loop.
//! The control plane and metrics source are simulated in memory from a
//! JSON fixture, which makes the daemon a harness for trying policies
//! against recorded or hand-written traffic.
//!
//! # Usage
//!
//! ```text
//! capscaled check-config --config capscale.toml
//! capscaled simulate --config capscale.toml --fixture tables.json --runs 3
//! capscaled simulate --fixture tables.json --watch --interval 60
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use capscale_core::{CapscaleConfig, MemoryControlPlane};
use capscale_metrics::render_prometheus;
use capscale_runner::Runner;

/// Default log filter when `RUST_LOG` is unset. Tracing targets are module
/// paths, so every library crate is listed by its crate name.
const DEFAULT_LOG_FILTER: &str = "info,capscaled=debug,capscale_core=debug,capscale_policy=debug,\
capscale_executor=debug,capscale_metrics=debug,capscale_runner=debug";

#[derive(Parser)]
#[command(name = "capscaled", about = "capscale capacity autoscaling daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop against an in-memory control plane.
    Simulate {
        /// Policy file. The stock policy is used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON fixture describing tables and their traffic.
        #[arg(long)]
        fixture: PathBuf,

        /// Number of consecutive runs.
        #[arg(long, default_value = "1")]
        runs: u32,

        /// Keep running every `--interval` seconds until Ctrl-C.
        #[arg(long)]
        watch: bool,

        /// Seconds between runs in watch mode.
        #[arg(long, default_value = "60")]
        interval: u64,

        /// Print each run's summary in Prometheus text format instead of
        /// the JSON report.
        #[arg(long)]
        prometheus: bool,
    },

    /// Validate a policy file and exit.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Simulate {
            config,
            fixture,
            runs,
            watch,
            interval,
            prometheus,
        } => {
            let config = load_config(config.as_deref())?;
            let plane = MemoryControlPlane::from_fixture_file(&fixture)
                .with_context(|| format!("failed to load fixture {}", fixture.display()))?;
            let runner = Runner::new(Arc::new(plane.clone()), Arc::new(plane), config)?;

            if watch {
                run_watch(runner, Duration::from_secs(interval)).await;
                return Ok(());
            }
            for run in 1..=runs {
                let report = runner.run_once().await?;
                info!(run, planned = report.planned().count(), "simulated run finished");
                if prometheus {
                    print!("{}", render_prometheus(&report.summary));
                } else {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
            Ok(())
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            println!(
                "config ok: {} table override(s), pool capacity {}",
                config.tables.len(),
                config.settings.pool_capacity
            );
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CapscaleConfig> {
    match path {
        Some(path) => {
            let config = CapscaleConfig::from_file(path)
                .with_context(|| format!("invalid config {}", path.display()))?;
            info!(path = %path.display(), tables = config.tables.len(), "config loaded");
            Ok(config)
        }
        None => {
            info!("no config given, using stock policy");
            Ok(CapscaleConfig::default())
        }
    }
}

async fn run_watch(runner: Runner, interval: Duration) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        runner.run(interval, shutdown_rx).await;
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    if join_runner(handle).await {
        info!("capscaled stopped");
    }
}

/// Wait for the runner task. Returns false if it panicked or was cancelled.
async fn join_runner(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "capscale runner task failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_names_every_library_crate() {
        for target in [
            "capscale_core",
            "capscale_policy",
            "capscale_executor",
            "capscale_metrics",
            "capscale_runner",
        ] {
            assert!(
                DEFAULT_LOG_FILTER.contains(&format!("{target}=debug")),
                "missing {target}"
            );
        }
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn cli_parses_simulate() {
        let cli = Cli::try_parse_from([
            "capscaled",
            "--log-format",
            "json",
            "simulate",
            "--fixture",
            "tables.json",
            "--runs",
            "3",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Simulate { runs: 3, watch: false, .. }));
    }

    #[tokio::test]
    async fn panicked_runner_is_reported() {
        let handle = tokio::spawn(async { panic!("runner failed") });
        assert!(!join_runner(handle).await);

        let handle = tokio::spawn(async {});
        assert!(join_runner(handle).await);
    }
}
