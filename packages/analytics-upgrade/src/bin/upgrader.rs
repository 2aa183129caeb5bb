//! Analytics data upgrader
//!
//! # Usage
//!
//! ```bash
//! # Bring every store to the latest version
//! upgrader --config upgrade.yaml run
//!
//! # Show versions and pending steps without changing anything
//! upgrader --config upgrade.yaml status
//!
//! # Undo the mongo step that starts at v2
//! upgrader --config upgrade.yaml restore --controller mongo --from 2
//! ```
//!
//! Without `--config` (or `ANALYTICS_UPGRADE_CONFIG`) the stores are read
//! from `<data-dir>/mongo` and `<data-dir>/elastic`.

use analytics_upgrade::{
    builtin_registry, RefreshStatus, RoundResults, UpgradeConfig, UpgradeContext, Upgrader,
    Version, CONFIG_ENV, ELASTIC, MONGO,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "upgrader")]
#[command(about = "Migrate analytics data to the latest schema version", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    /// Store root used when no configuration file is given
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run rounds until every controller is up to date
    Run {
        /// Give up after this many transform rounds
        #[arg(long)]
        max_rounds: Option<u32>,
    },

    /// Connect and refresh once, without transforming
    Status,

    /// Undo one migration step of a controller
    Restore {
        /// Controller name
        #[arg(long)]
        controller: String,

        /// Origin version of the step to undo
        #[arg(long)]
        from: Version,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<UpgradeConfig> {
    match &cli.config {
        Some(path) => UpgradeConfig::from_yaml(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            info!(
                "No configuration file, using stores under {}",
                cli.data_dir.display()
            );
            Ok(UpgradeConfig::default()
                .with_store(MONGO, cli.data_dir.join(MONGO))
                .with_store(ELASTIC, cli.data_dir.join(ELASTIC)))
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli)?;
    let registry = builtin_registry();
    let mut ctx = UpgradeContext::new(config);

    match cli.command {
        Commands::Run { max_rounds } => {
            let mut upgrader = Upgrader::new(&registry);
            if let Some(limit) = max_rounds {
                upgrader = upgrader.with_max_rounds(limit);
            }
            let report = upgrader.run(&mut ctx).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for round in &report.rounds {
                    for (name, step) in &round.transformed {
                        println!("round {}: {} {}", round.round, name, step);
                    }
                }
                print_results(&report.final_results);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let results = Upgrader::new(&registry).status(&mut ctx).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
            let fatal = results.values().any(|r| r.status == RefreshStatus::Fatal);
            Ok(if fatal {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Restore { controller, from } => {
            let step = Upgrader::new(&registry)
                .restore(&mut ctx, &controller, from)
                .await?;
            println!("{} restored: {}", controller, step);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_results(results: &RoundResults) {
    println!(
        "{:<12} {:<6} {:<16} {:<10} REQUIRES",
        "CONTROLLER", "CODE", "STATUS", "VERSION"
    );
    for (name, result) in results {
        let requires = result
            .requirements
            .iter()
            .map(|(other, version)| format!("{}={}", other, version))
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<12} {:<6} {:<16} {:<10} {}",
            name,
            result.status.code(),
            result.status.to_string(),
            result.version.to_string(),
            if requires.is_empty() { "-" } else { requires.as_str() }
        );
        if let Some(detail) = &result.detail {
            println!("{:<12} {}", "", detail);
        }
    }
}
