//! In-memory sink for testing and embedding.

use async_trait::async_trait;

use crate::error::{PersistError, PersistResult};
use crate::traits::sink::{PersistenceSink, TableLayout};
use crate::types::record::Record;

/// Keeps every appended row group in memory, in append order.
///
/// Not suitable for large batches as nothing is written out.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    layout: Option<TableLayout>,
    groups: Vec<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout received on open.
    pub fn layout(&self) -> Option<&TableLayout> {
        self.layout.as_ref()
    }

    /// One entry per append call.
    pub fn groups(&self) -> &[Vec<Record>] {
        &self.groups
    }

    /// All rows as table cells, in append order.
    pub fn rows(&self) -> Vec<Vec<String>> {
        match &self.layout {
            Some(layout) => self.groups.iter().flatten().map(|r| layout.row(r)).collect(),
            None => Vec::new(),
        }
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn open(&mut self, layout: &TableLayout) -> PersistResult<()> {
        self.layout = Some(layout.clone());
        Ok(())
    }

    async fn append(&mut self, records: &[Record]) -> PersistResult<()> {
        if self.layout.is_none() {
            return Err(PersistError::NotOpened);
        }
        self.groups.push(records.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
