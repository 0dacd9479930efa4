//! Subcommands

pub mod dump;
pub mod fix_gaps;
pub mod harvest;
pub mod ingest;
pub mod status;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use prepline_store::{Db, RawStore};

use crate::config::Config;

/// Open the relational store and the raw store named by the config.
pub fn open_stores(config: &Config) -> Result<(Db, RawStore)> {
    let db_path = config.paths.db_path();
    let db = Db::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    let raw_dir = config.paths.raw_dir();
    let raw = RawStore::open(&raw_dir)
        .with_context(|| format!("Failed to open raw store: {}", raw_dir.display()))?;
    Ok((db, raw))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date format: {e}"))
}
