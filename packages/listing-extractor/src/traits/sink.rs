//! Persistence sink trait and the row layout shared by all sinks.
//!
//! A sink is opened once with the batch's [`TableLayout`], then receives one
//! [`PersistenceSink::append`] call per successfully extracted URL. Each
//! append is a complete, flushed unit: a crash between two appends never
//! leaves half a row group behind.

use async_trait::async_trait;

use crate::error::PersistResult;
use crate::types::{
    record::{Record, RAW_CONTENT_FIELD},
    schema::ExtractionSchema,
};

/// Name of the column that carries a record's `source`.
pub const URL_COLUMN: &str = "URL";

/// Ordered column names of the persisted table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    columns: Vec<String>,
}

impl TableLayout {
    /// `URL` followed by the requested fields.
    pub fn structured(schema: &ExtractionSchema) -> Self {
        let mut columns = vec![URL_COLUMN.to_string()];
        columns.extend(schema.requested_names().into_iter().map(str::to_string));
        Self { columns }
    }

    /// `URL, Scraped_Content`.
    pub fn raw_only() -> Self {
        Self {
            columns: vec![URL_COLUMN.to_string(), RAW_CONTENT_FIELD.to_string()],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Cells of `record` in column order.
    pub fn row(&self, record: &Record) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| {
                let value = if column == URL_COLUMN {
                    Some(record.source())
                } else {
                    record.get(column)
                };
                value.unwrap_or_default().to_string()
            })
            .collect()
    }

    /// `record` as a JSON object keyed by column.
    pub fn object(&self, record: &Record) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.row(record).into_iter().map(serde_json::Value::String))
            .collect()
    }
}

/// Append-only destination for extracted records.
#[async_trait]
pub trait PersistenceSink: Send {
    /// Prepare the destination. Called once, before the first append.
    async fn open(&mut self, layout: &TableLayout) -> PersistResult<()>;

    /// Persist one URL's records.
    async fn append(&mut self, records: &[Record]) -> PersistResult<()>;

    /// Get the sink name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<S: PersistenceSink + ?Sized> PersistenceSink for Box<S> {
    async fn open(&mut self, layout: &TableLayout) -> PersistResult<()> {
        (**self).open(layout).await
    }

    async fn append(&mut self, records: &[Record]) -> PersistResult<()> {
        (**self).append(records).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
