//! Ingest subcommand - load raw documents into the database

use anyhow::Result;
use clap::Args;

use prepline_core::SharedProgress;
use prepline_osf::{IngestConfig, Ingestor, reindex};
use prepline_store::Db;

use super::open_stores;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Reprocess every record, not only new or changed ones
    #[arg(long)]
    pub force: bool,

    /// Maximum number of records to ingest
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Records per transaction
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Rebuild raw document tracking from the raw store first
    #[arg(long)]
    pub reindex: bool,
}

fn ingest_config(args: &IngestArgs, config: &Config) -> IngestConfig {
    let mut ingest = config.ingest_config();
    ingest.force = args.force;
    ingest.limit = args.limit;
    if let Some(n) = args.batch_size {
        ingest.batch_size = n;
    }
    ingest
}

pub fn run(args: IngestArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let ingest = ingest_config(&args, config);
    let (db, raw) = open_stores(config)?;

    if args.reindex {
        reindex(&db, &raw, None)?;
    }

    let summary = Ingestor::new(&db, &raw, &ingest, progress).run()?;
    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    for (record_id, error) in &summary.failures {
        log::warn!("{record_id}: failed to parse: {error}");
    }

    if summary.interrupted {
        anyhow::bail!("Ingest interrupted");
    }
    check_unresolved(&db)
}

/// Fail while any record is still in the failure report.
///
/// Later runs skip those records unless forced.
fn check_unresolved(db: &Db) -> Result<()> {
    let failures = db.ingest_failures()?;
    if failures.is_empty() {
        return Ok(());
    }
    for f in &failures {
        log::debug!("{}: unresolved since {}: {}", f.record_id, f.failed_at, f.error);
    }
    anyhow::bail!(
        "{} records failed to parse (see `prepline status`); fix the raw documents and rerun with --force",
        failures.len()
    )
}
