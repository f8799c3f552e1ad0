use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use graft_core::status::ProgressMode;
use graft_core::{Config, GraftError, SideChannelPolicy, Stage};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod commands;

use commands::{parse_local, Target};

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Build a binary on a remote build executor", long_about = None)]
struct Cli {
    /// Config file (default: ~/.graft/config.json)
    #[arg(long, global = true, env = "GRAFT_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "debug", "graft_core=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a recipe on the executor, printing the definition to stdout
    Build {
        /// Executor address (tcp://host:port or unix:///path)
        #[arg(long, env = "GRAFT_ADDR")]
        addr: Option<String>,

        /// Recipe file (JSON). The built-in Go recipe is used when omitted
        #[arg(short, long)]
        recipe: Option<PathBuf>,

        /// Local directory binding (NAME=PATH), repeatable
        #[arg(short, long = "local", value_parser = parse_local)]
        local: Vec<(String, PathBuf)>,

        /// Progress output: auto, plain, tty or quiet
        #[arg(long)]
        progress: Option<ProgressMode>,

        /// Solve deadline in seconds, 0 disables it
        #[arg(long, env = "GRAFT_TIMEOUT")]
        timeout: Option<u64>,

        /// On a failed definition write: fail or warn
        #[arg(long)]
        side_channel: Option<SideChannelPolicy>,

        /// Which graph to solve
        #[arg(long, value_enum, default_value_t = Target::Output)]
        target: Target,
    },

    /// Print the marshalled definition without contacting the executor
    Dump {
        /// Recipe file (JSON)
        #[arg(short, long)]
        recipe: Option<PathBuf>,

        /// Which graph to print
        #[arg(long, value_enum, default_value_t = Target::Output)]
        target: Target,

        /// Indented JSON instead of the wire encoding
        #[arg(long)]
        pretty: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let stage = err.downcast_ref::<GraftError>().map(GraftError::stage);
            let stage = stage.unwrap_or(Stage::Configure);
            eprintln!("{} failed to {}: {:#}", "✗".red().bold(), stage, err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env()?;
            config
        }
        None => Config::load()?,
    };

    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    graft_core::init_observability(&log_level).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Build { addr, recipe, local, progress, timeout, side_channel, target } => {
            if let Some(addr) = addr {
                config.addr = addr;
            }
            if let Some(timeout) = timeout {
                config.timeout_secs = (timeout > 0).then_some(timeout);
            }
            if let Some(progress) = progress {
                config.progress = progress;
            }
            if let Some(policy) = side_channel {
                config.side_channel = policy;
            }

            let cancel = CancellationToken::new();
            cancel_on_signal(cancel.clone());

            let args = commands::BuildArgs { recipe, local, target };
            commands::build(&config, args, cancel).await?;
        }

        Commands::Dump { recipe, target, pretty } => {
            commands::dump(recipe.as_deref(), target, pretty)?;
        }

        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = match cli.config {
                    Some(path) => {
                        config.save_to(&path)?;
                        path
                    }
                    None => {
                        config.save()?;
                        Config::config_path()
                    }
                };
                eprintln!("{} Saved to {}", "✓".green(), path.display());
            }
        }
    }

    Ok(())
}

/// Cancel `token` when SIGINT or SIGTERM is received.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::warn!("Received SIGINT (Ctrl+C), cancelling solve");
            }
            _ = terminate => {
                tracing::warn!("Received SIGTERM, cancelling solve");
            }
        }

        token.cancel();
    });
}
