//! Pipeline status snapshot for the `status` command

use crate::db::Db;
use crate::error::StorageError;
use crate::windows::{HarvestWindow, WindowStatus};

/// Window and ingest completion counts.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub windows: Vec<(WindowStatus, usize)>,
    pub oldest_unresolved: Option<HarvestWindow>,
    pub latest_complete: Option<String>,
    pub raw_documents: usize,
    pub raw_records: usize,
    pub preprints: usize,
    pub latest_versions: usize,
    pub contributors: usize,
    pub subjects: usize,
    pub pending_ingest: usize,
    pub parse_failures: usize,
    pub latest_modified: Option<String>,
}

impl StatusReport {
    pub fn windows_with(&self, status: WindowStatus) -> usize {
        self.windows
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }

    /// Anything left for a later harvest, repair or ingest run.
    pub fn has_backlog(&self) -> bool {
        self.pending_ingest > 0
            || self.windows_with(WindowStatus::Partial) > 0
            || self.windows_with(WindowStatus::Failed) > 0
    }
}

impl Db {
    /// Collect a status snapshot, optionally for one provider's windows.
    pub fn status(&self, provider: Option<&str>) -> Result<StatusReport, StorageError> {
        let windows = self.window_counts(provider)?;
        let oldest_unresolved = self.oldest_unresolved_window(provider)?;
        let pending_ingest = self.pending_count()?;

        let conn = self.lock_conn()?;
        let count = |sql: &str| -> Result<usize, StorageError> {
            let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
            Ok(n as usize)
        };
        let raw_documents = count("SELECT COUNT(*) FROM raw_data")?;
        let raw_records = count("SELECT COUNT(DISTINCT record_id) FROM raw_data")?;
        let preprints = count("SELECT COUNT(*) FROM preprints")?;
        let latest_versions = count("SELECT COUNT(*) FROM preprints WHERE is_latest_version = 1")?;
        let contributors = count("SELECT COUNT(*) FROM contributors")?;
        let subjects = count("SELECT COUNT(*) FROM subjects")?;
        let parse_failures = count("SELECT COUNT(*) FROM ingest_failures")?;
        let latest_modified: Option<String> =
            conn.query_row("SELECT MAX(date_modified) FROM preprints", [], |r| r.get(0))?;
        let latest_complete: Option<String> = conn.query_row(
            "SELECT MAX(date) FROM harvest_windows \
             WHERE status = 'complete' AND (?1 IS NULL OR provider = ?1)",
            [provider],
            |r| r.get(0),
        )?;

        Ok(StatusReport {
            windows,
            oldest_unresolved,
            latest_complete,
            raw_documents,
            raw_records,
            preprints,
            latest_versions,
            contributors,
            subjects,
            pending_ingest,
            parse_failures,
            latest_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windows::WindowUpdate;
    use chrono::NaiveDate;

    #[test]
    fn empty_database_has_no_backlog() {
        let db = Db::in_memory().unwrap();
        let report = db.status(None).unwrap();
        assert_eq!(report.preprints, 0);
        assert_eq!(report.windows_with(WindowStatus::Complete), 0);
        assert!(report.latest_complete.is_none());
        assert!(!report.has_backlog());
    }

    #[test]
    fn partial_window_is_backlog() {
        let db = Db::in_memory().unwrap();
        db.finish_window(
            "psyarxiv",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            &WindowUpdate {
                status: WindowStatus::Partial,
                record_count: 40,
                pages: 1,
                attempted_at: "2024-03-02T00:00:00.000000Z",
                error: Some("HTTP 503: Service Unavailable"),
            },
        )
        .unwrap();
        let report = db.status(Some("psyarxiv")).unwrap();
        assert_eq!(report.windows_with(WindowStatus::Partial), 1);
        assert!(report.has_backlog());
        assert_eq!(
            report.oldest_unresolved.unwrap().last_error.as_deref(),
            Some("HTTP 503: Service Unavailable")
        );
    }
}
