use clap::{Parser, Subcommand};
use hospital_registry::config::{AppConfig, ConfigLayer};
use hospital_registry::logger;
use hospital_registry::types::now_millis;
use hospital_registry::Registry;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::time::MissedTickBehavior;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "hospital-registry", version, about = "Hospital/user record registry")]
struct Cli {
    /// Path to a config file (TOML)
    #[arg(long, help = "Path to a config file (TOML). If omitted, ./hospital-registry.toml or $HOSPITAL_CONFIG is used.")]
    config: Option<PathBuf>,
    /// Override the snapshot directory (takes precedence over config)
    #[arg(long, help = "Directory holding the collection snapshots. Takes precedence over config/env.")]
    data_dir: Option<PathBuf>,
    #[arg(long, help = "Log level: error|warn|info|debug|trace")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(name = "serve", about = "Serve the HTTP API until Ctrl-C, then write a snapshot")]
    Serve {
        #[arg(long, help = "Listen address, e.g. 0.0.0.0:3000")]
        bind: Option<SocketAddr>,
        #[arg(long, help = "Seconds between deactivation sweeps; 0 disables them")]
        sweep_interval: Option<u64>,
    },
    #[command(name = "sweep", about = "Deactivate records whose plan expired, then write a snapshot")]
    Sweep {
        #[arg(long, help = "Cutoff in epoch milliseconds (default: now)")]
        cutoff: Option<i64>,
    },
    #[command(name = "report-unpaid", about = "Print unpaid members as JSON lines")]
    ReportUnpaid {
        #[arg(long, help = "Cutoff in epoch milliseconds (default: now)")]
        cutoff: Option<i64>,
    },
    #[command(name = "show-config", about = "Print the resolved configuration as TOML")]
    ShowConfig,
}

fn cli_layer(cli: &Cli) -> ConfigLayer {
    let mut layer = ConfigLayer {
        data_dir: cli.data_dir.clone(),
        log_level: cli.log_level.clone(),
        ..ConfigLayer::default()
    };
    if let Commands::Serve { bind, sweep_interval } = &cli.command {
        layer.bind_addr = bind.map(|b| b.to_string());
        layer.sweep_interval_secs = *sweep_interval;
    }
    layer
}

/// Builds the registry and restores the last snapshot from `data_dir`.
fn open_registry(cfg: &AppConfig) -> Result<Registry, Box<dyn Error>> {
    std::fs::create_dir_all(&cfg.data_dir)?;
    let registry = Registry::new(cfg);
    let loaded = registry.engine.load_snapshot(&cfg.data_dir)?;
    log::info!("opened data_dir={} documents={}", cfg.data_dir.display(), loaded);
    Ok(registry)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutdown requested");
}

async fn serve(cfg: AppConfig) -> CliResult {
    match cfg.log_dir.as_deref() {
        Some(dir) => logger::configure_logging(Some(dir), Some(&cfg.log_level), Some(cfg.log_retention))?,
        None => logger::init_console(Some(&cfg.log_level))?,
    }
    let registry = open_registry(&cfg)?;

    let sweeper = cfg.sweep_interval().map(|every| {
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.sweep(now_millis()).await {
                    log::error!("sweep failed: {e}");
                }
            }
        })
    });

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    log::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, registry.router()).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(task) = sweeper {
        task.abort();
    }
    let written = registry.engine.save_snapshot(&cfg.data_dir)?;
    log::info!("snapshot written: data_dir={} documents={}", cfg.data_dir.display(), written);
    Ok(())
}

async fn run(cli: Cli) -> CliResult {
    let cfg = AppConfig::load(cli.config.as_deref(), cli_layer(&cli))?;
    match cli.command {
        Commands::Serve { .. } => serve(cfg).await,
        Commands::Sweep { cutoff } => {
            logger::init_console(Some(&cfg.log_level))?;
            let registry = open_registry(&cfg)?;
            let report = registry.sweep(cutoff.unwrap_or_else(now_millis)).await?;
            registry.engine.save_snapshot(&cfg.data_dir)?;
            println!("{}", serde_json::to_string(&report)?);
            Ok(())
        }
        Commands::ReportUnpaid { cutoff } => {
            logger::init_console(Some(&cfg.log_level))?;
            let registry = open_registry(&cfg)?;
            for row in registry.service.unpaid_members(cutoff.unwrap_or_else(now_millis)).await? {
                println!("{}", serde_json::to_string(&row)?);
            }
            Ok(())
        }
        Commands::ShowConfig => {
            print!("{}", toml::to_string(&cfg)?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
