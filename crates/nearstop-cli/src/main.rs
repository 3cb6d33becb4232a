//! nearstop: arms a station proximity alarm from the command line.
//!
//! Position fixes arrive as JSON lines (`{"latitude":..,"longitude":..}`)
//! on stdin or from a file; `demo` runs the built-in simulated countdown.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

mod commands;
mod logging;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nearstop_core::{Config, Target};

use commands::monitor::Outcome;

#[derive(Parser)]
#[command(name = "nearstop")]
#[command(about = "Station proximity alarm", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch live position fixes and sound the alarm near a station
    Watch {
        /// Station name shown in the alarm
        #[arg(long)]
        name: String,

        /// Station latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Station longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Read fixes from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Run the simulated countdown against the test target
    Demo,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // These work even when the current config is unreadable.
    match &cli.command {
        Commands::Config {
            action: ConfigAction::Path,
        } => return commands::config::path(config_path),
        Commands::Config {
            action: ConfigAction::Init { force },
        } => {
            let path = commands::config::init(config_path, *force)?;
            println!("{}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load(config_path)?;
    logging::init(&config.logging)?;

    let outcome = match cli.command {
        Commands::Watch {
            name,
            lat,
            lon,
            input,
        } => {
            let target = Target::station(name, lat, lon);
            commands::monitor::watch(&config, target, input.as_deref(), cli.json).await?
        }
        Commands::Demo => commands::monitor::demo(&config, cli.json).await?,
        Commands::Config { .. } => return commands::config::show(&config),
    };

    if outcome == Outcome::FeedEnded {
        anyhow::bail!("Location feed ended before reaching the station");
    }
    Ok(())
}
