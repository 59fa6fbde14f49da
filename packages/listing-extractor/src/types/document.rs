//! Fetched page content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw text obtained for one URL, before any extraction.
///
/// Fetchers only produce a `RawDocument` on success; a failed fetch is an error,
/// never an empty document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// URL the document was requested for
    pub url: String,

    /// Page text (markdown or cleaned HTML)
    pub text: String,

    /// Page title if the fetcher found one
    pub title: Option<String>,

    /// MIME type of `text` (e.g. "text/markdown")
    pub content_type: Option<String>,

    /// When the content was fetched
    pub fetched_at: DateTime<Utc>,
}

impl RawDocument {
    /// Create a document fetched now.
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            title: None,
            content_type: None,
            fetched_at: Utc::now(),
        }
    }

    /// Set the page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Check if this document has any text.
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
