//! Raw Store: one JSON document per harvested record
//!
//! Directory layout:
//! ```text
//! {root}/
//! └── {provider}/
//!     └── {YYYY}/{MM}/{DD}/      # harvest window day
//!         └── {record_id}.json   # envelope: ids, fetched_at, payload
//! ```
//!
//! A record harvested again for the same day overwrites its file; a later
//! day gets its own file. Files are written via tmp→rename and never
//! deleted by the pipeline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::hash::{content_hash, short_hash};
use crate::time::timestamp;

/// One fetched API document, borrowed from the page it came from.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    pub record_id: &'a str,
    pub provider: &'a str,
    pub window_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub payload: &'a serde_json::Value,
}

/// On-disk form of a raw document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub record_id: String,
    pub provider: String,
    pub window_date: NaiveDate,
    pub fetched_at: String,
    pub payload: serde_json::Value,
}

/// Where a raw document landed; becomes a `raw_data` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRaw {
    pub record_id: String,
    pub provider: String,
    pub window_date: NaiveDate,
    pub fetched_at: String,
    /// Path relative to the store root, `/`-separated
    pub path: String,
    /// blake3 of the serialized payload
    pub content_hash: String,
}

/// Filesystem-backed raw document store.
#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    /// Open (and create) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative key for a record: `{provider}/{YYYY}/{MM}/{DD}/{record_id}.json`.
    pub fn relative_path(provider: &str, date: NaiveDate, record_id: &str) -> String {
        format!(
            "{provider}/{:04}/{:02}/{:02}/{record_id}.json",
            date.year(),
            date.month(),
            date.day()
        )
    }

    /// Absolute path for a relative key.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Persist one record atomically, overwriting the same day's copy.
    pub fn write(&self, record: &RawRecord<'_>) -> Result<StoredRaw, StorageError> {
        check_segment("record_id", record.record_id)?;
        check_segment("provider", record.provider)?;

        let relative = Self::relative_path(record.provider, record.window_date, record.record_id);
        let final_path = self.resolve(&relative);
        let dir = final_path
            .parent()
            .ok_or_else(|| io::Error::other("raw path has no parent"))?;
        fs::create_dir_all(dir)?;

        let fetched_at = timestamp(record.fetched_at);
        let envelope = RawEnvelope {
            record_id: record.record_id.to_string(),
            provider: record.provider.to_string(),
            window_date: record.window_date,
            fetched_at: fetched_at.clone(),
            payload: record.payload.clone(),
        };
        let body = serde_json::to_vec(&envelope)?;
        let hash = content_hash(&serde_json::to_vec(record.payload)?);

        let tmp_path = dir.join(format!(".{}.json.tmp", record.record_id));
        fs::write(&tmp_path, &body)?;
        fs::rename(&tmp_path, &final_path)?;
        log::debug!("{relative} [{}]", short_hash(&hash));

        Ok(StoredRaw {
            record_id: envelope.record_id,
            provider: envelope.provider,
            window_date: record.window_date,
            fetched_at,
            path: relative,
            content_hash: hash,
        })
    }

    /// Read a stored document's bytes by relative key.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>, StorageError> {
        Ok(fs::read(self.resolve(relative))?)
    }

    /// All documents stored for one provider and day, sorted by path.
    pub fn list_day(&self, provider: &str, date: NaiveDate) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.resolve(&format!(
            "{provider}/{:04}/{:02}/{:02}",
            date.year(),
            date.month(),
            date.day()
        ));
        self.glob_json(&dir, "*.json")
    }

    /// Walk every stored document and describe it as a `raw_data` row.
    ///
    /// Files that fail to parse as envelopes are logged and skipped.
    pub fn scan(&self, provider: Option<&str>) -> Result<Vec<StoredRaw>, StorageError> {
        let pattern = match provider {
            Some(p) => format!("{p}/*/*/*/*.json"),
            None => "*/*/*/*/*.json".to_string(),
        };
        let mut out = Vec::new();
        for path in self.glob_json(&self.root, &pattern)? {
            let bytes = fs::read(&path)?;
            let envelope: RawEnvelope = match serde_json::from_slice(&bytes) {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Skipping unreadable raw document {}: {e}", path.display());
                    continue;
                }
            };
            let relative = path
                .strip_prefix(&self.root)
                .map_err(io::Error::other)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(StoredRaw {
                content_hash: content_hash(&serde_json::to_vec(&envelope.payload)?),
                record_id: envelope.record_id,
                provider: envelope.provider,
                window_date: envelope.window_date,
                fetched_at: envelope.fetched_at,
                path: relative,
            });
        }
        Ok(out)
    }

    fn glob_json(&self, dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, StorageError> {
        let full = format!(
            "{}/{pattern}",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let paths = glob::glob(&full).map_err(io::Error::other)?;
        let mut out = Vec::new();
        for entry in paths {
            out.push(entry.map_err(io::Error::from)?);
        }
        out.sort();
        Ok(out)
    }
}

/// Reject ids that would escape or restructure the directory layout.
fn check_segment(what: &str, value: &str) -> Result<(), StorageError> {
    let bad = value.is_empty()
        || value.starts_with('.')
        || value.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {what} for raw path: {value:?}"),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn record<'a>(id: &'a str, payload: &'a serde_json::Value) -> RawRecord<'a> {
        RawRecord {
            record_id: id,
            provider: "psyarxiv",
            window_date: day(),
            fetched_at: Utc.with_ymd_and_hms(2024, 3, 2, 4, 0, 0).unwrap(),
            payload,
        }
    }

    #[test]
    fn write_uses_hierarchical_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path()).unwrap();
        let payload = json!({"id": "abc12", "attributes": {"title": "T"}});

        let stored = store.write(&record("abc12", &payload)).unwrap();
        assert_eq!(stored.path, "psyarxiv/2024/03/01/abc12.json");
        assert_eq!(stored.fetched_at, "2024-03-02T04:00:00.000000Z");
        assert!(dir.path().join("psyarxiv/2024/03/01/abc12.json").exists());

        let envelope: RawEnvelope = serde_json::from_slice(&store.read(&stored.path).unwrap()).unwrap();
        assert_eq!(envelope.record_id, "abc12");
        assert_eq!(envelope.payload, payload);
    }

    #[test]
    fn same_day_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path()).unwrap();
        let v1 = json!({"id": "abc12", "attributes": {"title": "old"}});
        let v2 = json!({"id": "abc12", "attributes": {"title": "new"}});

        let first = store.write(&record("abc12", &v1)).unwrap();
        let second = store.write(&record("abc12", &v2)).unwrap();
        assert_eq!(first.path, second.path);
        assert_ne!(first.content_hash, second.content_hash);
        assert_eq!(store.list_day("psyarxiv", day()).unwrap().len(), 1);

        let envelope: RawEnvelope = serde_json::from_slice(&store.read(&second.path).unwrap()).unwrap();
        assert_eq!(envelope.payload["attributes"]["title"], "new");
    }

    #[test]
    fn list_day_ignores_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path()).unwrap();
        let payload = json!({});
        for id in ["a1", "b2", "c3"] {
            store.write(&record(id, &payload)).unwrap();
        }
        std::fs::write(dir.path().join("psyarxiv/2024/03/01/.d4.json.tmp"), b"{").unwrap();

        let listed = store.list_day("psyarxiv", day()).unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed[0].ends_with("a1.json"));
    }

    #[test]
    fn list_day_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path()).unwrap();
        assert!(store.list_day("psyarxiv", day()).unwrap().is_empty());
    }

    #[test]
    fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path()).unwrap();
        let payload = json!({});
        assert!(store.write(&record("../escape", &payload)).is_err());
        assert!(store.write(&record("", &payload)).is_err());
        assert!(store.write(&record("a/b", &payload)).is_err());
    }

    #[test]
    fn scan_rebuilds_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path()).unwrap();
        let payload = json!({"id": "abc12"});
        let written = store.write(&record("abc12", &payload)).unwrap();
        std::fs::write(dir.path().join("psyarxiv/2024/03/01/broken.json"), b"not json").unwrap();

        let scanned = store.scan(Some("psyarxiv")).unwrap();
        assert_eq!(scanned, vec![written]);
        assert!(store.scan(Some("other")).unwrap().is_empty());
    }

    #[test]
    fn scan_root_with_glob_metacharacters() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(&dir.path().join("raw [2024]*")).unwrap();
        let payload = json!({"id": "abc12"});
        store.write(&record("abc12", &payload)).unwrap();
        store.write(&record("def34", &payload)).unwrap();

        assert_eq!(store.list_day("psyarxiv", day()).unwrap().len(), 2);
        assert_eq!(store.scan(None).unwrap().len(), 2);
    }
}
