pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rigquote_core::config::{AppConfig, ConfigError, LoadOptions, LogFormat};
use tracing::warn;

#[derive(Debug, Parser)]
#[command(
    name = "rigquote",
    about = "Rigquote operator CLI",
    long_about = "Inspect configuration, check catalog readiness, list compatible parts, price estimate drafts, and run lifecycle smoke checks.",
    after_help = "Examples:\n  rigquote doctor --json\n  rigquote compatible --select cpu-7800x3d\n  rigquote price --estimate draft.json\n  rigquote smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config and catalog snapshot readability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List parts compatible with the current selection")]
    Compatible {
        #[arg(long, help = "Catalog snapshot JSON (defaults to catalog.path from config)")]
        catalog: Option<PathBuf>,
        #[arg(long = "select", value_name = "PART_ID", help = "Selected part id; repeatable")]
        select: Vec<String>,
        #[arg(long, help = "Ignore combination rules and list the whole active catalog")]
        all: bool,
    },
    #[command(about = "Price an estimate draft JSON file (parts and service lines)")]
    Price {
        #[arg(long, value_name = "PATH")]
        estimate: PathBuf,
    },
    #[command(about = "Run an in-memory estimate lifecycle end to end with per-check timing")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let (config, load_error) = startup_config();
    init_logging(&config);
    if let Some(error) = load_error {
        warn!(
            event_name = "config.defaults_fallback",
            error = %error,
            "configuration did not load; logging with built-in defaults"
        );
    }

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Compatible { catalog, select, all } => {
            commands::compatible::run(catalog, select, all)
        }
        Command::Price { estimate } => commands::price::run(&estimate),
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Config used to set up logging. Falls back to defaults and hands back the load error so the
/// caller can report it once a subscriber exists.
pub fn startup_config() -> (AppConfig, Option<ConfigError>) {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config, None),
        Err(error) => (AppConfig::default(), Some(error)),
    }
}

/// Installs the fmt subscriber on stderr so stdout carries only command payloads.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging was already initialized: {error}");
    }
}
