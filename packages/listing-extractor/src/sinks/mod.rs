//! Persistence sink implementations.
//!
//! Available sinks:
//! - `CsvSink` - Append-only CSV file, fsynced per append
//! - `JsonSink` - JSON array file, atomically rewritten per append
//! - `SheetsSink` - Google Sheets `values:append`
//! - `MemorySink` - In-memory row groups (testing and embedding)
//! - `FanOutSink` - Writes to several sinks in order

pub mod csv;
pub mod fanout;
pub mod json;
pub mod memory;
pub mod sheets;

pub use self::csv::CsvSink;
pub use fanout::FanOutSink;
pub use json::JsonSink;
pub use memory::MemorySink;
pub use sheets::SheetsSink;
