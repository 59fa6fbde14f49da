//! JSON array sink.
//!
//! Keeps every row in memory and rewrites the file on each append through a
//! temporary file and a rename, so readers never see a half-written array.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PersistError, PersistResult};
use crate::traits::sink::{PersistenceSink, TableLayout};
use crate::types::record::Record;

/// Persists rows as a pretty-printed JSON array of objects.
///
/// Rows already in the file when the sink opens are kept.
pub struct JsonSink {
    path: PathBuf,
    layout: Option<TableLayout>,
    rows: Vec<Value>,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layout: None,
            rows: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self) -> PersistResult<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = std::fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, &self.rows)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for JsonSink {
    async fn open(&mut self, layout: &TableLayout) -> PersistResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        self.rows = match std::fs::read_to_string(&self.path) {
            Ok(contents) if !contents.trim().is_empty() => serde_json::from_str(&contents)?,
            Ok(_) => Vec::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        self.layout = Some(layout.clone());
        self.write_atomic()
    }

    async fn append(&mut self, records: &[Record]) -> PersistResult<()> {
        let layout = self.layout.as_ref().ok_or(PersistError::NotOpened)?;
        let new_rows: Vec<Value> = records
            .iter()
            .map(|r| Value::Object(layout.object(r)))
            .collect::<Vec<_>>();

        let kept = self.rows.len();
        self.rows.extend(new_rows);
        if let Err(e) = self.write_atomic() {
            // Keep memory in step with what is on disk
            self.rows.truncate(kept);
            return Err(e);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Read a JSON sink file back as column → value objects.
pub fn read_rows(path: impl AsRef<Path>) -> PersistResult<Vec<Map<String, Value>>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rows_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sorted_data.json");

        let mut sink = JsonSink::new(&path);
        sink.open(&TableLayout::raw_only()).await.unwrap();
        assert!(read_rows(&path).unwrap().is_empty());

        sink.append(&[Record::raw("https://a", "A")]).await.unwrap();
        sink.append(&[Record::raw("https://b", "B")]).await.unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["URL"], "https://a");
        assert_eq!(rows[1]["Scraped_Content"], "B");
        assert!(!dir.path().join("sorted_data.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_existing_rows_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"[{"URL": "https://old", "Scraped_Content": "x"}]"#).unwrap();

        let mut sink = JsonSink::new(&path);
        sink.open(&TableLayout::raw_only()).await.unwrap();
        sink.append(&[Record::raw("https://new", "y")]).await.unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["URL"], "https://old");
    }

    #[tokio::test]
    async fn test_failed_write_drops_rows() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let path = out.join("sorted_data.json");

        let mut sink = JsonSink::new(&path);
        sink.open(&TableLayout::raw_only()).await.unwrap();
        sink.append(&[Record::raw("https://a", "A")]).await.unwrap();

        std::fs::remove_dir_all(&out).unwrap();
        assert!(sink.append(&[Record::raw("https://b", "B")]).await.is_err());

        std::fs::create_dir_all(&out).unwrap();
        sink.append(&[Record::raw("https://c", "C")]).await.unwrap();

        let urls: Vec<_> = read_rows(&path)
            .unwrap()
            .iter()
            .map(|row| row["URL"].clone())
            .collect();
        assert_eq!(urls, vec!["https://a", "https://c"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonSink::new(&path)
            .open(&TableLayout::raw_only())
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Json(_)));
    }
}
