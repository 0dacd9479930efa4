//! prepline - preprint metadata harvest and ingest pipeline
//!
//! Harvests OSF preprint metadata into a raw document store, repairs
//! incomplete harvest windows, and ingests raw documents into SQLite.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "prepline")]
#[command(about = "Preprint metadata harvest and ingest pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./prepline.toml or ~/.config/prepline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest preprint metadata into the raw store
    Harvest(cmd::harvest::HarvestArgs),
    /// Ingest new raw documents into the database
    Ingest(cmd::ingest::IngestArgs),
    /// Re-harvest missing, partial and failed windows
    FixGaps(cmd::fix_gaps::FixGapsArgs),
    /// Show harvest and ingest progress
    Status(cmd::status::StatusArgs),
    /// Export preprints to Parquet
    Dump(cmd::dump::DumpArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    prepline_core::install_signal_handlers().context("Failed to install signal handlers")?;

    // Progress context (TTY auto-detect)
    let progress = Arc::new(prepline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --quiet, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    prepline_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Harvest(args) => cmd::harvest::run(args, &config, &progress),
        Command::Ingest(args) => cmd::ingest::run(args, &config, &progress),
        Command::FixGaps(args) => cmd::fix_gaps::run(args, &config, &progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Dump(args) => cmd::dump::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Raw store",
                &config.paths.raw_dir().display().to_string(),
            ]);
            table.add_row(vec![
                "Database",
                &config.paths.db_path().display().to_string(),
            ]);
            table.add_row(vec!["API base URL", &config.api.base_url]);
            table.add_row(vec![
                "API token",
                if config.api.token.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec!["Page size", &config.api.page_size.to_string()]);
            table.add_row(vec![
                "Request spacing",
                &format!("{}ms", config.api.min_delay_ms),
            ]);
            table.add_row(vec!["Timeout", &format!("{}s", config.api.timeout_secs)]);
            table.add_row(vec!["Max retries", &config.api.max_retries.to_string()]);
            table.add_row(vec!["Provider", &config.harvest.provider]);
            table.add_row(vec!["Start date", &config.harvest.start_date.to_string()]);
            table.add_row(vec![
                "Outage threshold",
                &format!("{} windows", config.harvest.max_consecutive_failures),
            ]);
            table.add_row(vec!["Workers", &config.harvest.workers.to_string()]);
            table.add_row(vec![
                "Ingest batch size",
                &config.ingest.batch_size.to_string(),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
