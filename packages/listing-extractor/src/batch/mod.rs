//! Batch runs over many URLs.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{BatchOrchestrator, BatchRequest, DEFAULT_CALL_TIMEOUT};
pub use state::{
    BatchProgress, BatchReport, BatchState, BatchStatus, BatchSummary, RawText, UrlOutcome,
    UrlStage,
};
