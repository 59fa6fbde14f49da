//! Per-run output folder and the artifacts written after a batch.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use listing_extractor::BatchState;
use std::path::{Path, PathBuf};

pub const CSV_FILE: &str = "all_sorted_data.csv";
pub const JSON_FILE: &str = "sorted_data.json";
pub const RAW_FILE: &str = "all_raw_data.md";
pub const PAGINATION_CSV_FILE: &str = "pagination_urls.csv";
pub const PAGINATION_JSON_FILE: &str = "pagination_urls.json";

/// `<root>/<domain>_<YYYY_MM_DD__HH_MM_SS>`, named after the first URL's host.
pub fn run_dir(root: &Path, first_url: Option<&str>, now: DateTime<Local>) -> PathBuf {
    let domain = first_url
        .and_then(|u| url::Url::parse(u).ok())
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|host| {
            host.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
        })
        .unwrap_or_else(|| "batch".to_string());

    root.join(format!("{}_{}", domain, now.format("%Y_%m_%d__%H_%M_%S")))
}

/// Remove a run folder that nothing was written to.
pub fn discard_if_empty(dir: &Path) {
    let is_empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if is_empty && std::fs::remove_dir(dir).is_ok() {
        tracing::debug!(path = %dir.display(), "Removed empty run folder");
    }
}

/// Write the raw-text and pagination artifacts.
pub fn write_artifacts(dir: &Path, state: &BatchState) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let raw_path = dir.join(RAW_FILE);
    std::fs::write(&raw_path, state.joined_raw_text())
        .with_context(|| format!("Failed to write {}", raw_path.display()))?;
    written.push(raw_path);

    if let Some(pagination) = &state.pagination {
        let csv_path = dir.join(PAGINATION_CSV_FILE);
        pagination
            .write_csv(&csv_path)
            .with_context(|| format!("Failed to write {}", csv_path.display()))?;
        written.push(csv_path);

        let json_path = dir.join(PAGINATION_JSON_FILE);
        pagination
            .write_json(&json_path)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        written.push(json_path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use listing_extractor::PaginationResult;

    #[test]
    fn test_run_dir_name() {
        let now = Local.with_ymd_and_hms(2024, 9, 3, 14, 5, 9).unwrap();
        let dir = run_dir(Path::new("output"), Some("https://www.cars.com/shopping?x=1"), now);
        assert_eq!(dir, PathBuf::from("output/www_cars_com_2024_09_03__14_05_09"));

        let dir = run_dir(Path::new("output"), None, now);
        assert_eq!(dir, PathBuf::from("output/batch_2024_09_03__14_05_09"));
    }

    #[test]
    fn test_discard_if_empty() {
        let root = tempfile::tempdir().unwrap();
        let empty = root.path().join("empty");
        let used = root.path().join("used");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::create_dir_all(&used).unwrap();
        std::fs::write(used.join(CSV_FILE), "URL\n").unwrap();

        discard_if_empty(&empty);
        discard_if_empty(&used);
        discard_if_empty(&root.path().join("missing"));

        assert!(!empty.exists());
        assert!(used.join(CSV_FILE).exists());
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = BatchState::new(vec!["https://a.com".to_string()]);

        let written = write_artifacts(dir.path(), &state).unwrap();
        assert_eq!(written.len(), 1);

        state.pagination = Some(PaginationResult {
            page_url: "https://a.com".to_string(),
            urls: vec!["https://a.com/?page=2".to_string()],
            ..Default::default()
        });
        let written = write_artifacts(dir.path(), &state).unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.path().join(PAGINATION_JSON_FILE).exists());
    }
}
