//! # TAPWORKS Room Server
//!
//! ## Usage
//!
//! ```bash
//! tapworks_server --config config/server.toml --bind 0.0.0.0:5000 --host-name app1
//! ```
//!
//! Log level comes from `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use tapworks_economy::{Economy, ItemCatalog, JournalLedger, LedgerStore, MemoryLedger};
use tapworks_server::{HostDirectory, LocalHostDirectory, RoomServer, ServerConfig, ServerResult};

#[derive(Parser, Debug)]
#[command(author, version, about = "TAPWORKS room economy server", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Address to listen on.
    #[arg(long)]
    bind: Option<String>,
    /// This server's name in the host directory.
    #[arg(long)]
    host_name: Option<String>,
    /// Item catalog file.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Ledger journal file.
    #[arg(long)]
    journal: Option<PathBuf>,
    /// Forecast horizon in milliseconds.
    #[arg(long)]
    horizon_ms: Option<i64>,
}

impl Cli {
    fn into_config(self) -> ServerResult<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(host_name) = self.host_name {
            config.host_name = host_name;
        }
        if let Some(catalog) = self.catalog {
            config.catalog_path = catalog;
        }
        if let Some(journal) = self.journal {
            config.journal_path = Some(journal);
        }
        if let Some(horizon) = self.horizon_ms {
            config.forecast_horizon_ms = horizon;
        }
        config.validate()?;
        Ok(config)
    }
}

fn run(cli: Cli) -> ServerResult<()> {
    let config = cli.into_config()?;

    let catalog = Arc::new(ItemCatalog::load(&config.catalog_path)?);
    let ledger: Arc<dyn LedgerStore> = match &config.journal_path {
        Some(path) => Arc::new(JournalLedger::open(path)?),
        None => {
            tracing::warn!("no journal_path configured; ledger is in memory only");
            Arc::new(MemoryLedger::new())
        }
    };
    let economy =
        Arc::new(Economy::new(catalog, ledger).with_horizon(config.forecast_horizon_ms));

    let hosts = Arc::new(LocalHostDirectory::new(config.hosts.clone()));
    hosts.reset()?;

    let server = RoomServer::bind(config, economy, hosts)?;
    server.run()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            ExitCode::FAILURE
        }
    }
}
