//! Raw-data tracking and ingest state
//!
//! `raw_data` says which documents exist on disk and when they were
//! fetched; `ingest_state` says which fetch of each record is reflected in
//! the normalized tables. Their difference is the ingest backlog.

use chrono::NaiveDate;
use rusqlite::params;

use crate::db::Db;
use crate::error::StorageError;
use crate::raw::StoredRaw;
use crate::time::day_key;

/// A raw document waiting to be ingested (latest fetch of its record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRaw {
    pub record_id: String,
    pub window_date: NaiveDate,
    pub fetched_at: String,
    pub path: String,
}

/// A record whose latest raw document could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub record_id: String,
    pub fetched_at: String,
    pub path: String,
    pub error: String,
    pub failed_at: String,
}

/// Selection of the ingest backlog.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingQuery {
    /// Every record's latest document, ingested or not
    pub force: bool,
    pub limit: Option<usize>,
}

/// Latest document per record; `rn = 1` picks the newest fetch.
const LATEST_RAW: &str = "
    SELECT record_id, window_date, fetched_at, path,
           ROW_NUMBER() OVER (
               PARTITION BY record_id ORDER BY fetched_at DESC, window_date DESC
           ) AS rn
    FROM raw_data";

impl Db {
    /// Track documents written to the Raw Store, in one transaction.
    ///
    /// A re-harvest with an unchanged payload keeps the earlier
    /// `fetched_at` so it does not re-enter the ingest backlog.
    pub fn track_raw(&self, docs: &[StoredRaw]) -> Result<(), StorageError> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO raw_data (record_id, window_date, provider, fetched_at, path, content_hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(record_id, window_date) DO UPDATE SET \
                   fetched_at = excluded.fetched_at, \
                   path = excluded.path, \
                   content_hash = excluded.content_hash \
                 WHERE raw_data.content_hash <> excluded.content_hash",
            )?;
            for doc in docs {
                stmt.execute(params![
                    doc.record_id,
                    day_key(doc.window_date),
                    doc.provider,
                    doc.fetched_at,
                    doc.path,
                    doc.content_hash,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Records whose latest raw document is newer than their ingest state.
    ///
    /// Without `force`, a document that already failed to parse at the same
    /// `fetched_at` is left out until it is re-harvested.
    pub fn pending_raw(&self, query: PendingQuery) -> Result<Vec<PendingRaw>, StorageError> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT r.record_id, r.window_date, r.fetched_at, r.path
             FROM ({LATEST_RAW}) r
             LEFT JOIN ingest_state s ON s.record_id = r.record_id
             LEFT JOIN ingest_failures f
                ON f.record_id = r.record_id AND f.fetched_at = r.fetched_at
             WHERE r.rn = 1
               AND (?1 OR ((s.fetched_at IS NULL OR r.fetched_at > s.fetched_at)
                           AND f.record_id IS NULL))
             ORDER BY r.window_date, r.record_id
             LIMIT ?2"
        );
        let limit = query.limit.map_or(-1, |n| n as i64);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![query.force, limit], |row| {
                let date: String = row.get(1)?;
                Ok(PendingRaw {
                    record_id: row.get(0)?,
                    window_date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    fetched_at: row.get(2)?,
                    path: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Size of the default (non-forced) backlog.
    pub fn pending_count(&self) -> Result<usize, StorageError> {
        let conn = self.lock_conn()?;
        let n: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM ({LATEST_RAW}) r
                 LEFT JOIN ingest_state s ON s.record_id = r.record_id
                 LEFT JOIN ingest_failures f
                    ON f.record_id = r.record_id AND f.fetched_at = r.fetched_at
                 WHERE r.rn = 1
                   AND (s.fetched_at IS NULL OR r.fetched_at > s.fetched_at)
                   AND f.record_id IS NULL"
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Ingest state for one record: the `fetched_at` last ingested.
    pub fn ingested_fetch(&self, record_id: &str) -> Result<Option<String>, StorageError> {
        use rusqlite::OptionalExtension;
        let conn = self.lock_conn()?;
        let fetched = conn
            .query_row(
                "SELECT fetched_at FROM ingest_state WHERE record_id = ?1",
                params![record_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fetched)
    }

    /// The "failed to parse" report, oldest failure first.
    pub fn ingest_failures(&self) -> Result<Vec<IngestFailure>, StorageError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, fetched_at, path, error, failed_at FROM ingest_failures \
             ORDER BY failed_at, record_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(IngestFailure {
                    record_id: row.get(0)?,
                    fetched_at: row.get(1)?,
                    path: row.get(2)?,
                    error: row.get(3)?,
                    failed_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
