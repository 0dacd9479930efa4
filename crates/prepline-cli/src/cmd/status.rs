//! Status subcommand - harvest and ingest progress

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use prepline_core::fmt_num;
use prepline_store::{StatusReport, WindowStatus};

use super::open_stores;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only count windows of this provider
    #[arg(short, long)]
    pub provider: Option<String>,
}

fn format_report(report: &StatusReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    for status in [
        WindowStatus::Complete,
        WindowStatus::Pending,
        WindowStatus::Partial,
        WindowStatus::Failed,
    ] {
        let n = report.windows_with(status);
        let color = match status {
            WindowStatus::Partial | WindowStatus::Failed if n > 0 => Color::Red,
            WindowStatus::Complete => Color::Green,
            _ => Color::Reset,
        };
        table.add_row(vec![
            Cell::new(format!("Windows {status}")).fg(color),
            Cell::new(fmt_num(n)).fg(color),
        ]);
    }
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    table.add_row(vec!["Latest complete window".into(), opt(&report.latest_complete)]);
    table.add_row(vec![
        "Oldest unresolved window".into(),
        report
            .oldest_unresolved
            .as_ref()
            .map_or_else(|| "-".into(), |w| format!("{} {} ({})", w.provider, w.date, w.status)),
    ]);
    table.add_row(vec!["Raw documents".into(), fmt_num(report.raw_documents)]);
    table.add_row(vec!["Distinct records".into(), fmt_num(report.raw_records)]);
    table.add_row(vec![
        "Preprints".into(),
        format!(
            "{} ({} latest versions)",
            fmt_num(report.preprints),
            fmt_num(report.latest_versions)
        ),
    ]);
    table.add_row(vec!["Contributors".into(), fmt_num(report.contributors)]);
    table.add_row(vec!["Subjects".into(), fmt_num(report.subjects)]);
    table.add_row(vec!["Pending ingest".into(), fmt_num(report.pending_ingest)]);
    table.add_row(vec!["Failed to parse".into(), fmt_num(report.parse_failures)]);
    table.add_row(vec!["Latest date_modified".into(), opt(&report.latest_modified)]);
    format!("\n{table}")
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let (db, _raw) = open_stores(config)?;
    let report = db.status(args.provider.as_deref())?;
    eprintln!("{}", format_report(&report));
    if report.has_backlog() {
        eprintln!("Backlog remaining: run fix-gaps and/or ingest");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_all_window_states() {
        let report = StatusReport {
            windows: vec![(WindowStatus::Complete, 12), (WindowStatus::Failed, 1)],
            preprints: 3,
            ..Default::default()
        };
        let text = format_report(&report);
        assert!(text.contains("Windows complete"));
        assert!(text.contains("Windows failed"));
        assert!(text.contains("Pending ingest"));
    }
}
