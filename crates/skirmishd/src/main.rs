//! skirmishd — the Skirmish daemon.
//!
//! One binary, two roles:
//! - `master`: supervises the worker fleet, keeps one public lobby open,
//!   and serves the client-facing HTTP API plus Prometheus metrics
//! - `worker`: hosts game sessions on its own port; spawned by the master
//!
//! # Usage
//!
//! ```text
//! skirmishd master --config skirmish.toml
//! WORKER_ID=3 skirmishd worker --config skirmish.toml
//! ```

mod master;
mod worker_mode;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use skirmish_core::{ServerConfig, WORKER_ID_ENV, WorkerId};

#[derive(Parser)]
#[command(name = "skirmishd", about = "Skirmish game server daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the master: worker supervision, lobby scheduling, client API.
    Master {
        /// Path to skirmish.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Client API port (overrides `master.port`).
        #[arg(long)]
        port: Option<u16>,

        /// Number of workers (overrides `num_workers`).
        #[arg(long)]
        workers: Option<u32>,

        /// Directory holding the SPA bundle (overrides `master.static_dir`).
        #[arg(long)]
        static_dir: Option<String>,
    },

    /// Run one game worker.
    Worker {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker index. Falls back to the `WORKER_ID` environment variable.
        #[arg(long)]
        worker_id: Option<WorkerId>,

        /// First worker port (overrides `workers.base_port`).
        #[arg(long)]
        base_port: Option<u16>,
    },

    /// Print the effective configuration as TOML.
    ShowConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Workers speak the readiness handshake on stdout, so their logs go to stderr.
    let to_stderr = matches!(cli.command, Command::Worker { .. });
    init_tracing(cli.log_json, to_stderr);

    match cli.command {
        Command::Master {
            config,
            port,
            workers,
            static_dir,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(port) = port {
                cfg.master.port = port;
            }
            if let Some(workers) = workers {
                cfg.num_workers = workers;
            }
            if let Some(dir) = static_dir {
                cfg.master.static_dir = dir;
            }
            cfg.validate()?;
            master::run_master(cfg, config).await
        }
        Command::Worker {
            config,
            worker_id,
            base_port,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(base_port) = base_port {
                cfg.workers.base_port = base_port;
            }
            cfg.validate()?;
            let worker_id = match worker_id {
                Some(id) => id,
                None => worker_id_from_env()?,
            };
            worker_mode::run_worker(cfg, worker_id).await
        }
        Command::ShowConfig { config } => {
            let cfg = load_config(config.as_deref())?;
            print!("{}", cfg.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool, to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,skirmishd=debug,skirmish=debug"));
    let writer = if to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// File (or defaults), then `GAME_ENV` / `ADMIN_TOKEN`.
fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn worker_id_from_env() -> anyhow::Result<WorkerId> {
    let raw = std::env::var(WORKER_ID_ENV)
        .with_context(|| format!("{WORKER_ID_ENV} is not set and --worker-id was not given"))?;
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {WORKER_ID_ENV}: {raw:?}"))
}
