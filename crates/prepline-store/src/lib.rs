//! prepline-store: raw document store and relational store
//!
//! The Raw Store keeps every harvested API document as a JSON file, the
//! permanent source of truth for reprocessing. The relational store
//! (SQLite) tracks harvest windows, raw documents and ingest state, and
//! holds the normalized preprint tables that query tooling reads.

pub mod db;
pub mod error;
pub mod export;
pub mod hash;
pub mod preprints;
pub mod raw;
pub mod schema;
pub mod status;
pub mod time;
pub mod tracking;
pub mod windows;

pub use db::Db;
pub use error::StorageError;
pub use export::{ExportOptions, export_preprints};
pub use hash::{content_hash, short_hash};
pub use preprints::{
    Authorship, BatchItem, BatchOutcome, ContributorRow, NormalizedPreprint, PreprintRow,
    SubjectRow,
};
pub use raw::{RawEnvelope, RawRecord, RawStore, StoredRaw};
pub use status::StatusReport;
pub use time::{day_key, now_timestamp, timestamp};
pub use tracking::{IngestFailure, PendingQuery, PendingRaw};
pub use windows::{HarvestWindow, WindowStatus, WindowUpdate};
