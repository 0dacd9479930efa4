//! Export of the flattened preprint view to Parquet

use std::path::Path;
use std::sync::{Arc, LazyLock};

use arrow::array::{ArrayRef, BooleanArray, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use prepline_core::ParquetSink;

use crate::db::Db;
use crate::error::StorageError;

/// Rows per record batch
const BATCH_ROWS: usize = 16 * 1024;

const TEXT_COLUMNS: [&str; 17] = [
    "base_id",
    "provider",
    "title",
    "description",
    "date_created",
    "date_modified",
    "date_published",
    "doi",
    "publication_doi",
    "preprint_doi",
    "license",
    "download_url",
    "contributors_list",
    "first_author",
    "subjects_list",
    "tags_list",
    "data_links_status",
];

pub static EXPORT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("version", DataType::Int64, true),
        Field::new("is_latest_version", DataType::Boolean, false),
        Field::new("contributor_count", DataType::Int64, false),
        Field::new("has_data_links", DataType::Boolean, false),
        Field::new("has_prereg_links", DataType::Boolean, false),
        Field::new("is_published", DataType::Boolean, true),
    ];
    fields.extend(TEXT_COLUMNS.iter().map(|c| Field::new(*c, DataType::Utf8, true)));
    Arc::new(Schema::new(fields))
});

/// Export options for `dump`.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Only rows flagged as the latest version of their base id
    pub latest_only: bool,
    pub zstd_level: i32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            latest_only: false,
            zstd_level: 3,
        }
    }
}

#[derive(Default)]
struct Columns {
    id: Vec<String>,
    version: Vec<Option<i64>>,
    is_latest_version: Vec<bool>,
    contributor_count: Vec<i64>,
    has_data_links: Vec<bool>,
    has_prereg_links: Vec<bool>,
    is_published: Vec<Option<bool>>,
    text: Vec<Vec<Option<String>>>,
}

impl Columns {
    fn new() -> Self {
        Self {
            text: vec![Vec::new(); TEXT_COLUMNS.len()],
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.id.len()
    }

    fn push(&mut self, row: &rusqlite::Row<'_>) -> rusqlite::Result<()> {
        self.id.push(row.get("id")?);
        self.version.push(row.get("version")?);
        self.is_latest_version.push(row.get("is_latest_version")?);
        self.contributor_count.push(row.get("contributor_count")?);
        self.has_data_links.push(row.get("has_data_links")?);
        self.has_prereg_links.push(row.get("has_prereg_links")?);
        self.is_published.push(row.get("is_published")?);
        for (col, name) in self.text.iter_mut().zip(TEXT_COLUMNS) {
            col.push(row.get(name)?);
        }
        Ok(())
    }

    fn take_batch(&mut self) -> Result<RecordBatch, StorageError> {
        let taken = std::mem::replace(self, Self::new());
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(taken.id)),
            Arc::new(Int64Array::from(taken.version)),
            Arc::new(BooleanArray::from(taken.is_latest_version)),
            Arc::new(Int64Array::from(taken.contributor_count)),
            Arc::new(BooleanArray::from(taken.has_data_links)),
            Arc::new(BooleanArray::from(taken.has_prereg_links)),
            Arc::new(BooleanArray::from(taken.is_published)),
        ];
        arrays.extend(
            taken
                .text
                .into_iter()
                .map(|col| Arc::new(StringArray::from(col)) as ArrayRef),
        );
        RecordBatch::try_new(EXPORT_SCHEMA.clone(), arrays)
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))
    }
}

/// Write `preprints_ui` to a zstd Parquet file. Returns rows written.
///
/// The file appears at `path` only once complete.
pub fn export_preprints(db: &Db, path: &Path, options: &ExportOptions) -> Result<usize, StorageError> {
    let mut sink = ParquetSink::create(path, EXPORT_SCHEMA.clone(), options.zstd_level)?;

    let conn = db.lock_conn()?;
    let sql = format!(
        "SELECT * FROM preprints_ui {} ORDER BY id",
        if options.latest_only {
            "WHERE is_latest_version = 1"
        } else {
            ""
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut columns = Columns::new();
    while let Some(row) = rows.next()? {
        columns.push(row)?;
        if columns.len() >= BATCH_ROWS {
            sink.write_batch(&columns.take_batch()?)?;
        }
    }
    if columns.len() > 0 {
        sink.write_batch(&columns.take_batch()?)?;
    }

    let written = sink.finalize()?;
    log::info!("Exported {written} preprints to {}", path.display());
    Ok(written)
}
