//! Data types shared by backends, sinks and the orchestrator.

pub mod document;
pub mod options;
pub mod record;
pub mod schema;
pub mod usage;
