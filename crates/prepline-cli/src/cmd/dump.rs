//! Dump subcommand - export preprints to Parquet

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use prepline_core::fmt_num;
use prepline_store::{ExportOptions, export_preprints};

use super::open_stores;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Output file (default: {data_dir}/preprints.parquet)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only the latest version of each preprint
    #[arg(long)]
    pub latest_only: bool,

    /// Zstd compression level (1-22)
    #[arg(short, long, default_value_t = 3)]
    pub zstd_level: i32,
}

pub fn run(args: DumpArgs, config: &Config) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| config.paths.data_dir.join("preprints.parquet"));
    let (db, _raw) = open_stores(config)?;

    let options = ExportOptions {
        latest_only: args.latest_only,
        zstd_level: args.zstd_level,
    };
    let rows = export_preprints(&db, &output, &options)
        .with_context(|| format!("Failed to export to {}", output.display()))?;

    log::info!("Wrote {} preprints to {}", fmt_num(rows), output.display());
    eprintln!("{} rows -> {}", fmt_num(rows), output.display());
    Ok(())
}
