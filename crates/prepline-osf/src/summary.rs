//! Run summaries for harvest, repair and ingest.
//!
//! TTY runs print a table on stderr; other runs log one line per stage.

use std::time::Duration;

use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use prepline_core::fmt_num;
use prepline_store::{HarvestWindow, WindowStatus};

/// Result of one window attempt.
#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub date: NaiveDate,
    pub status: WindowStatus,
    pub records: usize,
    pub pages: usize,
    pub error: Option<String>,
}

/// Harvest run totals.
#[derive(Debug, Clone, Default)]
pub struct HarvestSummary {
    pub provider: String,
    pub windows_attempted: usize,
    /// Already complete, not fetched again
    pub windows_skipped: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    /// Left pending: the current day, or interrupted before any page
    pub pending: usize,
    pub records_written: usize,
    pub pages: usize,
    /// `(window, error)` for every partial or failed window
    pub unresolved: Vec<(NaiveDate, String)>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl HarvestSummary {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    pub fn add(&mut self, outcome: &WindowOutcome) {
        self.windows_attempted += 1;
        self.records_written += outcome.records;
        self.pages += outcome.pages;
        match outcome.status {
            WindowStatus::Complete => self.complete += 1,
            WindowStatus::Pending => self.pending += 1,
            WindowStatus::Partial => self.partial += 1,
            WindowStatus::Failed => self.failed += 1,
        }
        if matches!(outcome.status, WindowStatus::Partial | WindowStatus::Failed) {
            let error = outcome.error.clone().unwrap_or_else(|| "unknown error".into());
            self.unresolved.push((outcome.date, error));
        }
    }

    /// Windows left `partial` or `failed`.
    pub fn unresolved_count(&self) -> usize {
        self.partial + self.failed
    }

    pub fn format_table(&self) -> String {
        let mut table = header_table(&format!("Harvest: {}", self.provider));
        row(&mut table, "Windows attempted", fmt_num(self.windows_attempted));
        if self.windows_skipped > 0 {
            row(&mut table, "Already complete", fmt_num(self.windows_skipped));
        }
        table.add_row(vec![
            Cell::new("Complete").fg(Color::Green),
            Cell::new(fmt_num(self.complete)).fg(Color::Green),
        ]);
        row(&mut table, "Pending", fmt_num(self.pending));
        status_row(&mut table, "Partial", self.partial);
        status_row(&mut table, "Failed", self.failed);
        row(&mut table, "Pages", fmt_num(self.pages));
        row(&mut table, "Records written", fmt_num(self.records_written));
        row(&mut table, "Elapsed", format!("{:.1}s", self.elapsed.as_secs_f64()));

        let mut out = format!("\n{table}");
        for (date, error) in &self.unresolved {
            out.push_str(&format!("\n  {date}: {error}"));
        }
        if self.interrupted {
            out.push_str("\n  Interrupted; rerun to resume");
        }
        out
    }

    pub fn log(&self) {
        log::info!("=== Harvest Summary ===");
        log::info!(
            "{}: {} windows ({} complete, {} pending, {} partial, {} failed), {} records in {} pages [{:.1}s]",
            self.provider,
            self.windows_attempted,
            self.complete,
            self.pending,
            self.partial,
            self.failed,
            fmt_num(self.records_written),
            fmt_num(self.pages),
            self.elapsed.as_secs_f64()
        );
        for (date, error) in &self.unresolved {
            log::warn!("{} {date}: unresolved: {error}", self.provider);
        }
        if self.interrupted {
            log::warn!("Harvest interrupted; rerun to resume");
        }
    }

    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }
}

/// Gap repair totals.
#[derive(Debug, Clone, Default)]
pub struct RepairSummary {
    pub gaps_found: usize,
    /// Never harvested before this pass
    pub missing: usize,
    pub harvest: HarvestSummary,
    /// Gaps still unresolved after this pass
    pub remaining: Vec<HarvestWindow>,
}

impl RepairSummary {
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn format_table(&self) -> String {
        let mut table = header_table("Gap Repair");
        row(&mut table, "Gaps found", fmt_num(self.gaps_found));
        row(&mut table, "Never harvested", fmt_num(self.missing));
        table.add_row(vec![
            Cell::new("Repaired").fg(Color::Green),
            Cell::new(fmt_num(self.harvest.complete)).fg(Color::Green),
        ]);
        status_row(&mut table, "Still unresolved", self.remaining.len());
        row(&mut table, "Records written", fmt_num(self.harvest.records_written));

        let mut out = format!("\n{table}");
        for w in &self.remaining {
            out.push_str(&format!(
                "\n  {} [{}]: {}",
                w.date,
                w.status,
                w.last_error.as_deref().unwrap_or("-")
            ));
        }
        out
    }

    pub fn log(&self) {
        log::info!("=== Gap Repair Summary ===");
        log::info!(
            "{} gaps ({} never harvested): {} repaired, {} remaining, {} records",
            self.gaps_found,
            self.missing,
            self.harvest.complete,
            self.remaining.len(),
            fmt_num(self.harvest.records_written)
        );
        for w in &self.remaining {
            log::warn!(
                "{} {} still {}: {}",
                w.provider,
                w.date,
                w.status,
                w.last_error.as_deref().unwrap_or("-")
            );
        }
    }

    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }
}

/// Ingest run totals.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    /// Raw documents selected for this run
    pub selected: usize,
    pub ingested: usize,
    /// Skipped as unparseable and written to the failure report
    pub failed: usize,
    pub contributors: usize,
    pub batches: usize,
    /// `(record_id, error)` for this run's parse failures
    pub failures: Vec<(String, String)>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl IngestSummary {
    pub fn format_table(&self) -> String {
        let mut table = header_table("Ingest");
        row(&mut table, "Selected", fmt_num(self.selected));
        table.add_row(vec![
            Cell::new("Ingested").fg(Color::Green),
            Cell::new(fmt_num(self.ingested)).fg(Color::Green),
        ]);
        status_row(&mut table, "Failed to parse", self.failed);
        row(&mut table, "Contributor rows", fmt_num(self.contributors));
        row(&mut table, "Batches", fmt_num(self.batches));
        row(&mut table, "Elapsed", format!("{:.1}s", self.elapsed.as_secs_f64()));

        let mut out = format!("\n{table}");
        for (id, error) in &self.failures {
            out.push_str(&format!("\n  {id}: {error}"));
        }
        if self.interrupted {
            out.push_str("\n  Interrupted; rerun to continue");
        }
        out
    }

    pub fn log(&self) {
        log::info!("=== Ingest Summary ===");
        log::info!(
            "{} selected, {} ingested, {} failed to parse, {} batches [{:.1}s]",
            fmt_num(self.selected),
            fmt_num(self.ingested),
            fmt_num(self.failed),
            self.batches,
            self.elapsed.as_secs_f64()
        );
        if self.interrupted {
            log::warn!("Ingest interrupted; rerun to continue");
        }
    }

    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }
}

fn header_table(title: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    table
}

fn row(table: &mut Table, label: &str, value: String) {
    table.add_row(vec![Cell::new(label), Cell::new(value)]);
}

/// Red when nonzero
fn status_row(table: &mut Table, label: &str, n: usize) {
    let color = if n > 0 { Color::Red } else { Color::Reset };
    table.add_row(vec![
        Cell::new(label).fg(color),
        Cell::new(fmt_num(n)).fg(color),
    ]);
}
