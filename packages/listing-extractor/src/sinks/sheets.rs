//! Google Sheets sink.
//!
//! One `values:append` request per append call, values sent RAW so the
//! spreadsheet does not reinterpret prices or dates.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::backends::ApiKey;
use crate::error::{PersistError, PersistResult};
use crate::traits::sink::{PersistenceSink, TableLayout};
use crate::types::record::Record;

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Appends rows to a Google spreadsheet.
///
/// Authenticates with an OAuth bearer token that has the spreadsheets scope.
pub struct SheetsSink {
    client: Client,
    token: ApiKey,
    spreadsheet_id: String,
    range: String,
    write_header: bool,
    base_url: String,
    layout: Option<TableLayout>,
}

impl SheetsSink {
    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            spreadsheet_id: spreadsheet_id.into(),
            range: "Sheet1".to_string(),
            write_header: true,
            base_url: SHEETS_API_URL.to_string(),
            layout: None,
        }
    }

    /// Target range in A1 notation (default: `Sheet1`).
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    /// Skip the header row, e.g. when appending to an existing sheet.
    pub fn without_header(mut self) -> Self {
        self.write_header = false;
        self
    }

    /// Set a custom base URL (proxies, test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// `.../{id}/values/{range}:append`, path segments percent-encoded.
    fn append_url(&self) -> PersistResult<url::Url> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| PersistError::Remote(format!("invalid Sheets base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PersistError::Remote("Sheets base URL cannot take a path".into()))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}:append", self.range));
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        Ok(url)
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> PersistResult<()> {
        let row_count = rows.len();
        let response = self
            .client
            .post(self.append_url()?)
            .bearer_auth(self.token.expose())
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Sheets append request failed");
                PersistError::Remote(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Sheets API error");
            return Err(PersistError::Remote(format!(
                "Sheets returned {}: {}",
                status, error_text
            )));
        }

        debug!(spreadsheet = %self.spreadsheet_id, rows = row_count, "Rows appended to sheet");
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for SheetsSink {
    async fn open(&mut self, layout: &TableLayout) -> PersistResult<()> {
        self.layout = Some(layout.clone());
        if self.write_header {
            self.append_rows(vec![layout.columns().to_vec()]).await?;
        }
        Ok(())
    }

    async fn append(&mut self, records: &[Record]) -> PersistResult<()> {
        let layout = self.layout.as_ref().ok_or(PersistError::NotOpened)?;
        if records.is_empty() {
            return Ok(());
        }
        let rows = records.iter().map(|r| layout.row(r)).collect();
        self.append_rows(rows).await
    }

    fn name(&self) -> &str {
        "sheets"
    }
}
