//! URL list loading.
//!
//! `.csv` files contribute their first column (a header row is skipped when
//! its first cell is not a URL); anything else is read one URL per line.

use anyhow::{Context, Result};
use std::path::Path;

pub fn load_urls(path: &Path) -> Result<Vec<String>> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let urls = if is_csv {
        load_csv(path)?
    } else {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read URL file {}", path.display()))?;
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    Ok(urls)
}

fn load_csv(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open URL file {}", path.display()))?;

    let mut urls = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Malformed CSV row {} in {}", index + 1, path.display()))?;
        let Some(cell) = row.get(0).map(str::trim).filter(|c| !c.is_empty()) else {
            continue;
        };
        if index == 0 && !looks_like_url(cell) {
            continue;
        }
        urls.push(cell.to_string());
    }

    Ok(urls)
}

fn looks_like_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
