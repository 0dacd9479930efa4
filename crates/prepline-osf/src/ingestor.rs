//! Ingestor: raw documents into normalized rows
//!
//! Selects the records whose latest raw document is newer than their
//! ingest state, parses them in parallel, and commits each batch in one
//! transaction. Unparseable documents are recorded in the failure report
//! inside the same transaction and do not stop the batch.

use std::time::Instant;

use prepline_core::{ProgressContext, fmt_num, is_shutdown_requested};
use prepline_store::{
    BatchItem, Db, PendingQuery, PendingRaw, RawStore, StorageError, now_timestamp,
};
use rayon::prelude::*;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::payload::{extract, parse_raw_document};
use crate::summary::IngestSummary;

pub struct Ingestor<'a> {
    db: &'a Db,
    raw: &'a RawStore,
    config: &'a IngestConfig,
    progress: &'a ProgressContext,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        db: &'a Db,
        raw: &'a RawStore,
        config: &'a IngestConfig,
        progress: &'a ProgressContext,
    ) -> Self {
        Self {
            db,
            raw,
            config,
            progress,
        }
    }

    /// Ingest the backlog (everything, with `force`) batch by batch.
    ///
    /// A storage failure rolls back the current batch and ends the run;
    /// earlier batches stay committed and the rest is retried next run.
    pub fn run(&self) -> Result<IngestSummary, IngestError> {
        let started = Instant::now();
        let pending = self.db.pending_raw(PendingQuery {
            force: self.config.force,
            limit: self.config.limit,
        })?;

        let mut summary = IngestSummary {
            selected: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            log::info!("Nothing to ingest");
            return Ok(summary);
        }
        log::info!(
            "Ingesting {} raw documents{}",
            fmt_num(pending.len()),
            if self.config.force { " (forced)" } else { "" }
        );

        let bar = self.progress.count_bar("ingest", pending.len() as u64);
        for batch in pending.chunks(self.config.batch_size.max(1)) {
            if is_shutdown_requested() {
                summary.interrupted = true;
                break;
            }

            let items: Vec<BatchItem> = batch.par_iter().map(|p| self.prepare(p)).collect();
            let outcome = match self.db.apply_batch(&items, &now_timestamp()) {
                Ok(outcome) => outcome,
                Err(e) => {
                    bar.finish_and_clear();
                    log::error!(
                        "Batch {} ({} records from {}) rolled back: {e}",
                        summary.batches + 1,
                        batch.len(),
                        batch[0].record_id
                    );
                    return Err(e.into());
                }
            };

            summary.batches += 1;
            summary.ingested += outcome.ingested;
            summary.failed += outcome.failed;
            summary.contributors += outcome.contributors;
            summary.failures.extend(items.into_iter().filter_map(|item| match item {
                BatchItem::Failed {
                    record_id, error, ..
                } => Some((record_id, error)),
                BatchItem::Ingested { .. } => None,
            }));
            bar.inc(batch.len() as u64);
            if !self.progress.is_tty() {
                log::info!(
                    "Batch {}: {} ingested, {} failed",
                    summary.batches,
                    outcome.ingested,
                    outcome.failed
                );
            }
        }
        bar.finish_and_clear();

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Read and normalize one raw document.
    pub fn prepare(&self, pending: &PendingRaw) -> BatchItem {
        let failed = |error: String| {
            log::warn!("{} ({}): skipped: {error}", pending.record_id, pending.path);
            BatchItem::Failed {
                record_id: pending.record_id.clone(),
                fetched_at: pending.fetched_at.clone(),
                path: pending.path.clone(),
                error,
            }
        };

        let bytes = match self.raw.read(&pending.path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return failed("raw document missing".into()),
            Err(e) => return failed(format!("unreadable raw document: {e}")),
        };
        let doc = match parse_raw_document(&bytes).and_then(|payload| extract(&payload)) {
            Ok(doc) => doc,
            Err(e) => return failed(e.to_string()),
        };
        if doc.id != pending.record_id {
            log::warn!(
                "{}: payload id {} differs from record id",
                pending.record_id,
                doc.id
            );
        }

        BatchItem::Ingested {
            record_id: pending.record_id.clone(),
            fetched_at: pending.fetched_at.clone(),
            rows: Box::new(doc.into_rows()),
        }
    }
}

/// Rebuild `raw_data` tracking from the files in the Raw Store.
///
/// Returns the number of documents found.
pub fn reindex(db: &Db, raw: &RawStore, provider: Option<&str>) -> Result<usize, StorageError> {
    let docs = raw.scan(provider)?;
    db.track_raw(&docs)?;
    log::info!("Reindexed {} raw documents from {}", fmt_num(docs.len()), raw.root().display());
    Ok(docs.len())
}
