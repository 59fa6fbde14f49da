//! Append-only CSV sink.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PersistError, PersistResult};
use crate::traits::sink::{PersistenceSink, TableLayout};
use crate::types::record::Record;

/// Appends rows to a CSV file.
///
/// The header is written only when the file is new or empty, so re-running
/// into the same file keeps adding rows under the existing header.
pub struct CsvSink {
    path: PathBuf,
    state: Option<(::csv::Writer<File>, TableLayout)>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceSink for CsvSink {
    async fn open(&mut self, layout: &TableLayout) -> PersistResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_new = file.metadata()?.len() == 0;
        if !is_new {
            check_header(&self.path, layout)?;
        }

        let mut writer = ::csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(layout.columns())?;
            writer.flush()?;
        }

        debug!(path = %self.path.display(), header_written = is_new, "CSV sink opened");
        self.state = Some((writer, layout.clone()));
        Ok(())
    }

    async fn append(&mut self, records: &[Record]) -> PersistResult<()> {
        let (writer, layout) = self.state.as_mut().ok_or(PersistError::NotOpened)?;

        for record in records {
            writer.write_record(layout.row(record))?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Refuse to append under a header written for other columns.
fn check_header(path: &Path, layout: &TableLayout) -> PersistResult<()> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut header = ::csv::StringRecord::new();
    if !reader.read_record(&mut header)? {
        return Ok(());
    }

    if header.iter().ne(layout.columns().iter().map(String::as_str)) {
        return Err(PersistError::LayoutMismatch {
            path: path.display().to_string(),
            found: header.iter().collect::<Vec<_>>().join(", "),
            expected: layout.columns().join(", "),
        });
    }
    Ok(())
}
