//! Error types for extraction, harvesting and ingestion

use chrono::NaiveDate;
use prepline_core::FetchError;
use prepline_store::StorageError;

use crate::summary::HarvestSummary;

/// A raw document that cannot be interpreted as a preprint.
///
/// Only the offending record is skipped; the batch carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Bytes on disk are not valid JSON
    NotJson(String),
    /// Valid JSON, but neither a JSON:API resource nor a flat record
    UnknownShape(String),
    /// Recognized shape without a usable record id
    MissingId,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotJson(msg) => write!(f, "not valid JSON: {msg}"),
            Self::UnknownShape(msg) => write!(f, "unrecognized document shape: {msg}"),
            Self::MissingId => write!(f, "document has no record id"),
        }
    }
}

impl std::error::Error for ParseError {}

/// `start > end` when building a [`DateRange`](crate::client::DateRange).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid date range: {} is after {}", self.start, self.end)
    }
}

impl std::error::Error for InvalidRange {}

/// Failures that end a harvest run early.
///
/// A single failed page or window is not one of these: it is recorded on
/// the window and reported in the [`HarvestSummary`].
#[derive(Debug)]
pub enum HarvestError {
    /// Raw Store or Relational Store write failed
    Storage(StorageError),
    /// Too many windows in a row failed on connectivity
    SystemicOutage {
        consecutive_failures: usize,
        last_error: FetchError,
        /// Progress up to the abort
        summary: Box<HarvestSummary>,
    },
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage failure during harvest: {e}"),
            Self::SystemicOutage {
                consecutive_failures,
                last_error,
                ..
            } => write!(
                f,
                "aborting harvest after {consecutive_failures} consecutive failed windows (last: {last_error})"
            ),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::SystemicOutage { last_error, .. } => Some(last_error),
        }
    }
}

impl From<StorageError> for HarvestError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// A batch could not be committed; its writes were rolled back.
#[derive(Debug)]
pub enum IngestError {
    Storage(StorageError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "ingest batch rolled back: {e}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
