//! # org-harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and schema |
//! | `harvest run [TOKEN]` | Harvest every organisation the token can see |
//! | `harvest stats` | Print stored record counts |
//!
//! ## Examples
//!
//! ```bash
//! # Fresh database, then a full harvest with the token from the environment
//! harvest init --reset
//! GITHUB_TOKEN=ghp_... harvest run
//!
//! # Machine-readable report
//! harvest run "$TOKEN" --json > report.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use org_harvest::{config, harvest, logging, migrate, report};

/// Harvest GitHub organisation data into SQLite.
#[derive(Parser)]
#[command(name = "harvest", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. Built-in defaults are used when
    /// that file does not exist.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace). Overrides `HARVEST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init {
        /// Drop every harvest table first.
        #[arg(long)]
        reset: bool,
    },

    /// Harvest all accessible organisations and print a report.
    Run {
        /// GitHub access token. Falls back to `GITHUB_TOKEN`.
        token: Option<String>,

        /// Drop every harvest table before harvesting.
        #[arg(long)]
        reset: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the number of stored records per entity.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref())?;

    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Init { reset } => {
            migrate::run_migrations(&cfg, reset).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Run { token, reset, json } => {
            let token = harvest::resolve_token(token)?;
            if let Some(result) = harvest::run(&cfg, &token, reset).await? {
                if json {
                    println!("{}", report::report_json(&result)?);
                } else {
                    print!("{}", report::render_report(&result));
                }
            }
        }
        Commands::Stats { json } => {
            report::run_stats(&cfg, json).await?;
        }
    }

    Ok(())
}
