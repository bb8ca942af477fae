// crates/stakeledger-staking/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stakeledger_common::StakingConfig;
use stakeledger_staking::script::{Script, ScriptRunner};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Token staking ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a staking script against an in-memory token
    Run {
        /// Staking configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Operations to replay (JSON); defaults to a deposit, top-up and withdrawal
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// Print the effective staking configuration
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stakeledger=info,stakeledger_staking=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, script } => {
            let config = load_config(config)?;
            let script = match script {
                Some(path) => Script::from_file(&path)
                    .with_context(|| format!("Failed to load script {}", path.display()))?,
                None => Script::deposit_top_up_withdraw(),
            };

            info!("Replaying {} operations", script.operations.len());
            let runner = ScriptRunner::new(config, &script)?;
            let reports = runner.run(&script.operations).await;

            let failed = reports.iter().filter(|r| r.error.is_some()).count();
            info!("Replay finished: {} succeeded, {} failed", reports.len() - failed, failed);
            info!("Controller metrics: {:?}", runner.controller().metrics());

            println!("{}", serde_json::to_string_pretty(&runner.snapshot().await)?);
        }
        Command::Config { config } => {
            let config = load_config(config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<StakingConfig> {
    match path {
        Some(path) => StakingConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(StakingConfig::default()),
    }
}
