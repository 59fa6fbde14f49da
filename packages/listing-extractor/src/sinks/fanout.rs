//! Sink that forwards to several sinks.

use async_trait::async_trait;

use crate::error::PersistResult;
use crate::traits::sink::{PersistenceSink, TableLayout};
use crate::types::record::Record;

/// Writes every call to each inner sink in order. The first failure stops
/// the call; sinks before it have already persisted the rows.
#[derive(Default)]
pub struct FanOutSink {
    sinks: Vec<Box<dyn PersistenceSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder pattern).
    pub fn with_sink(mut self, sink: impl PersistenceSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Add an already boxed sink.
    pub fn push(&mut self, sink: Box<dyn PersistenceSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl PersistenceSink for FanOutSink {
    async fn open(&mut self, layout: &TableLayout) -> PersistResult<()> {
        for sink in &mut self.sinks {
            sink.open(layout).await?;
        }
        Ok(())
    }

    async fn append(&mut self, records: &[Record]) -> PersistResult<()> {
        for sink in &mut self.sinks {
            sink.append(records).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fan-out"
    }
}
