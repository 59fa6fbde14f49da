//! Per-run batch state, outcomes and summaries.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::error::ExtractionError;
use crate::pagination::PaginationResult;
use crate::types::{record::Record, usage::TokenUsage};

/// Step a URL was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStage {
    Fetching,
    Extracting,
    Persisting,
}

impl fmt::Display for UrlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UrlStage::Fetching => "fetching",
            UrlStage::Extracting => "extracting",
            UrlStage::Persisting => "persisting",
        })
    }
}

/// What happened to one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UrlOutcome {
    Succeeded {
        url: String,
        records: usize,
        usage: TokenUsage,
        cost: f64,
    },
    Failed {
        url: String,
        stage: UrlStage,
        reason: String,
    },
}

impl UrlOutcome {
    pub fn url(&self) -> &str {
        match self {
            UrlOutcome::Succeeded { url, .. } | UrlOutcome::Failed { url, .. } => url,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, UrlOutcome::Failed { .. })
    }
}

/// Lifecycle of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Idle,
    Running,
    /// Ran to the end, or was cancelled between URLs (see `BatchState::cancelled`)
    Completed,
    /// Stopped by a persistence failure
    Halted { reason: String },
}

impl BatchStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, BatchStatus::Idle | BatchStatus::Running)
    }
}

/// Page text kept for the raw-data artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawText {
    pub url: String,
    pub text: String,
}

/// Everything a run has accumulated.
///
/// Owned and mutated by the orchestrator only; `processed_count` never
/// exceeds `urls.len()` and only grows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchState {
    /// Identifies the run in logs
    pub run_id: Uuid,
    pub urls: Vec<String>,
    pub processed_count: usize,
    pub outcomes: Vec<UrlOutcome>,
    pub records: Vec<Record>,
    pub raw_texts: Vec<RawText>,
    /// Extraction usage, pagination excluded
    pub usage: TokenUsage,
    /// Extraction cost, pagination excluded
    pub cost: f64,
    pub pagination: Option<PaginationResult>,
    pub status: BatchStatus,
    /// Stopped early by the cancellation token
    pub cancelled: bool,
}

impl BatchState {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            urls,
            ..Default::default()
        }
    }

    pub(crate) fn record_success(
        &mut self,
        url: &str,
        records: Vec<Record>,
        usage: TokenUsage,
        cost: f64,
    ) {
        self.outcomes.push(UrlOutcome::Succeeded {
            url: url.to_string(),
            records: records.len(),
            usage,
            cost,
        });
        self.records.extend(records);
        self.usage += usage;
        self.cost += cost;
        self.processed_count += 1;
    }

    pub(crate) fn record_failure(&mut self, url: &str, stage: UrlStage, error: &ExtractionError) {
        self.outcomes.push(UrlOutcome::Failed {
            url: url.to_string(),
            stage,
            reason: error.to_string(),
        });
        self.processed_count += 1;
    }

    pub(crate) fn record_raw_text(&mut self, url: &str, text: String) {
        self.raw_texts.push(RawText {
            url: url.to_string(),
            text,
        });
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn failed_urls(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_failure())
            .map(UrlOutcome::url)
            .collect()
    }

    /// Raw page texts joined for the markdown artifact.
    pub fn joined_raw_text(&self) -> String {
        self.raw_texts
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Totals across extraction and pagination.
    pub fn summary(&self) -> BatchSummary {
        let (pagination_usage, pagination_cost) = self
            .pagination
            .as_ref()
            .map(|p| (p.usage, p.cost))
            .unwrap_or_default();
        let usage = self.usage + pagination_usage;

        BatchSummary {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_cost: self.cost + pagination_cost,
            processed_count: self.processed_count,
            failed_count: self.failed_count(),
            cancelled: self.cancelled,
            pagination: self.pagination.clone(),
        }
    }

    /// Cheap view for observers.
    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            total: self.urls.len(),
            processed: self.processed_count,
            failed: self.failed_count(),
            usage: self.usage,
            cost: self.cost,
            last_url: self.outcomes.last().map(|o| o.url().to_string()),
            status: self.status.clone(),
        }
    }
}

/// Snapshot published after every processed URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub usage: TokenUsage,
    pub cost: f64,
    pub last_url: Option<String>,
    pub status: BatchStatus,
}

/// Batch totals. Token and cost totals include the pagination pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
    pub processed_count: usize,
    pub failed_count: usize,
    /// Fewer than all URLs were processed because the run was cancelled
    pub cancelled: bool,
    pub pagination: Option<PaginationResult>,
}

/// Final state of a run, plus the error that stopped it early, if any.
#[derive(Debug)]
pub struct BatchReport {
    pub state: BatchState,
    pub error: Option<ExtractionError>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        self.state.summary()
    }

    pub fn status(&self) -> &BatchStatus {
        &self.state.status
    }

    /// Turn a halted run into its error, dropping the partial state.
    pub fn into_result(self) -> crate::error::Result<BatchState> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.state),
        }
    }
}
