//! Omnibus load generator CLI.
//!
//! Drives virtual users against the Omnibus payments gateway and checks that
//! idempotent transfers are created exactly once.
//!
//! # Quick Start
//!
//! ```bash
//! # Dry run against the in-memory gateway
//! omnibus-loadgen run --simulate --users 20 --spawn-rate 5 --run-time 30
//!
//! # Live run, JSON report on the side
//! omnibus-loadgen run --host https://gateway.staging.internal --report-json report.json
//!
//! # One-off idempotency check
//! omnibus-loadgen verify-replay --host http://localhost:8080 --attempts 10
//! ```

mod commands;
mod http;
mod profiles;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Omnibus load generator - traffic and exactly-once checks for the payments gateway.
#[derive(Parser)]
#[command(name = "omnibus-loadgen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Directory holding loadgen.toml (defaults to the current directory).
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run a full load test.
    Run(commands::run::RunArgs),

    /// Provision one idempotency user and verify a replayed transfer once.
    VerifyReplay {
        /// Gateway base URL.
        #[arg(long)]
        host: Option<String>,

        /// Identical submissions to send.
        #[arg(short, long)]
        attempts: Option<u32>,

        /// Seed for usernames, amounts and keys.
        #[arg(long)]
        seed: Option<u64>,

        /// Use the in-memory gateway instead of the network.
        #[arg(long)]
        simulate: bool,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the merged configuration.
    Show {
        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);
    let project_dir = cli.project_dir.as_deref();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Run(args) => commands::run::run(project_dir, args).await,
        Commands::VerifyReplay {
            host,
            attempts,
            seed,
            simulate,
        } => {
            commands::verify_replay::run(project_dir, host, attempts, seed, simulate).await
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format } => commands::config::show(project_dir, &format),
        },
    }
}
