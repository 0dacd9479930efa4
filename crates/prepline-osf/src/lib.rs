//! Prepline OSF - preprint harvest and ingest pipeline
//!
//! Harvests preprint metadata from the OSF API into the Raw Store one day
//! window at a time, repairs windows left incomplete by earlier runs, and
//! ingests raw documents into the relational store.
//!
//! # Example
//!
//! ```no_run
//! use prepline_core::ProgressContext;
//! use prepline_osf::{ClientConfig, HarvestConfig, Harvester, OsfClient};
//! use prepline_store::{Db, RawStore};
//!
//! let client = OsfClient::new(ClientConfig::default()).expect("valid base URL");
//! let db = Db::open("data/preprints.db".as_ref()).expect("open database");
//! let raw = RawStore::open("data/raw".as_ref()).expect("open raw store");
//! let config = HarvestConfig::default();
//! let progress = ProgressContext::new();
//!
//! let harvester = Harvester::new(&client, &db, &raw, &config, &progress);
//! let summary = harvester.harvest_range(None).expect("harvest failed");
//! println!("{} records written", summary.records_written);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod gaps;
pub mod harvester;
pub mod ingestor;
pub mod payload;
pub mod summary;

// Re-exports for convenience
pub use client::{ApiRecord, Cursor, DateRange, OsfClient, Page, PageSource};
pub use config::{ClientConfig, HarvestConfig, IngestConfig};
pub use error::{HarvestError, IngestError, InvalidRange, ParseError};
pub use gaps::{find_gaps, repair};
pub use harvester::Harvester;
pub use ingestor::{Ingestor, reindex};
pub use payload::{PreprintDoc, extract, parse_raw_document};
pub use summary::{HarvestSummary, IngestSummary, RepairSummary, WindowOutcome};
