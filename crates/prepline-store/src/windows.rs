//! Harvest window bookkeeping (`harvest_windows` table)

use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};

use crate::db::Db;
use crate::error::StorageError;
use crate::time::day_key;

/// Harvest state of one provider-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowStatus {
    /// Known but not finished (never attempted, interrupted, or still open today)
    Pending,
    Complete,
    /// Some pages persisted, then a fetch failed
    Partial,
    /// First page already failed
    Failed,
}

impl WindowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::Pending, Self::Complete, Self::Partial, Self::Failed]
    }

    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }
}

impl std::fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `harvest_windows`, or a day that has no row yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestWindow {
    pub provider: String,
    pub date: NaiveDate,
    pub status: WindowStatus,
    pub record_count: usize,
    pub pages: usize,
    /// `None` for a window that was never attempted
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
}

impl HarvestWindow {
    /// A day with no stored state.
    pub fn missing(provider: &str, date: NaiveDate) -> Self {
        Self {
            provider: provider.to_string(),
            date,
            status: WindowStatus::Pending,
            record_count: 0,
            pages: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.last_attempt_at.is_some()
    }
}

/// Outcome of one harvest attempt, written back to the window row.
#[derive(Debug, Clone)]
pub struct WindowUpdate<'a> {
    pub status: WindowStatus,
    pub record_count: usize,
    pub pages: usize,
    pub attempted_at: &'a str,
    pub error: Option<&'a str>,
}

const WINDOW_COLUMNS: &str =
    "provider, date, status, record_count, pages, last_attempt_at, last_error";

fn window_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HarvestWindow> {
    let date: String = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(HarvestWindow {
        provider: row.get(0)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?,
        status: WindowStatus::from_name(&status).unwrap_or(WindowStatus::Pending),
        record_count: row.get::<_, i64>(3)? as usize,
        pages: row.get::<_, i64>(4)? as usize,
        last_attempt_at: row.get(5)?,
        last_error: row.get(6)?,
    })
}

impl Db {
    /// Stored state for one window, if any.
    pub fn window(&self, provider: &str, date: NaiveDate) -> Result<Option<HarvestWindow>, StorageError> {
        let conn = self.lock_conn()?;
        let window = conn
            .query_row(
                &format!("SELECT {WINDOW_COLUMNS} FROM harvest_windows WHERE provider = ?1 AND date = ?2"),
                params![provider, day_key(date)],
                window_from_row,
            )
            .optional()?;
        Ok(window)
    }

    /// Stored windows in `[start, end]`, oldest first. Days without a row are absent.
    pub fn windows_in_range(
        &self,
        provider: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HarvestWindow>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WINDOW_COLUMNS} FROM harvest_windows \
             WHERE provider = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date"
        ))?;
        let rows = stmt
            .query_map(params![provider, day_key(start), day_key(end)], window_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Create the row on first attempt and stamp the attempt time.
    ///
    /// An existing status is left alone until the attempt finishes.
    pub fn begin_window(&self, provider: &str, date: NaiveDate, attempted_at: &str) -> Result<(), StorageError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO harvest_windows (provider, date, status, last_attempt_at) \
             VALUES (?1, ?2, 'pending', ?3) \
             ON CONFLICT(provider, date) DO UPDATE SET last_attempt_at = excluded.last_attempt_at",
            params![provider, day_key(date), attempted_at],
        )?;
        Ok(())
    }

    /// Record the outcome of an attempt.
    pub fn finish_window(
        &self,
        provider: &str,
        date: NaiveDate,
        update: &WindowUpdate<'_>,
    ) -> Result<(), StorageError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO harvest_windows \
             (provider, date, status, record_count, pages, last_attempt_at, last_error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(provider, date) DO UPDATE SET \
               status = excluded.status, \
               record_count = excluded.record_count, \
               pages = excluded.pages, \
               last_attempt_at = excluded.last_attempt_at, \
               last_error = excluded.last_error",
            params![
                provider,
                day_key(date),
                update.status.as_str(),
                update.record_count as i64,
                update.pages as i64,
                update.attempted_at,
                update.error,
            ],
        )?;
        Ok(())
    }

    /// Most recent `complete` window for a provider.
    pub fn latest_complete_window(&self, provider: &str) -> Result<Option<NaiveDate>, StorageError> {
        let conn = self.lock_conn()?;
        let date: Option<String> = conn.query_row(
            "SELECT MAX(date) FROM harvest_windows WHERE provider = ?1 AND status = 'complete'",
            params![provider],
            |row| row.get(0),
        )?;
        Ok(date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()))
    }

    /// Window counts per status, all providers or one.
    pub fn window_counts(&self, provider: Option<&str>) -> Result<Vec<(WindowStatus, usize)>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM harvest_windows \
             WHERE ?1 IS NULL OR provider = ?1 GROUP BY status",
        )?;
        let counted = stmt
            .query_map(params![provider], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WindowStatus::all()
            .iter()
            .map(|&status| {
                let n = counted
                    .iter()
                    .find(|(s, _)| s == status.as_str())
                    .map_or(0, |(_, n)| *n as usize);
                (status, n)
            })
            .collect())
    }

    /// Oldest window that is not complete.
    pub fn oldest_unresolved_window(&self, provider: Option<&str>) -> Result<Option<HarvestWindow>, StorageError> {
        let conn = self.lock_conn()?;
        let window = conn
            .query_row(
                &format!(
                    "SELECT {WINDOW_COLUMNS} FROM harvest_windows \
                     WHERE (?1 IS NULL OR provider = ?1) AND status <> 'complete' \
                     ORDER BY date LIMIT 1"
                ),
                params![provider],
                window_from_row,
            )
            .optional()?;
        Ok(window)
    }
}
