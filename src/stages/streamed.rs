use std::path::Path;

use tracing::instrument;

use crate::error::Result;
use crate::metrics::StageMetrics;
use crate::predicate::RowPredicate;
use crate::stages::{Stage, StageReport};
use crate::stream::{ChunkedFilterProject, StreamConfig};

/// A stage backed by the chunked filter/project engine.
#[derive(Debug)]
pub struct StreamStage {
    name: String,
    config: StreamConfig,
    predicate: Option<Box<dyn RowPredicate>>,
}

impl StreamStage {
    pub fn new(name: impl Into<String>, config: StreamConfig) -> Self {
        Self {
            name: name.into(),
            config,
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Box<dyn RowPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn predicate(&self) -> Option<&dyn RowPredicate> {
        self.predicate.as_deref()
    }
}

impl Stage for StreamStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &Path {
        &self.config.source
    }

    fn destination(&self) -> &Path {
        &self.config.destination
    }

    #[instrument(skip(self), fields(stage = %self.name))]
    fn run(&self) -> Result<StageReport> {
        let report = ChunkedFilterProject::new(&self.config)
            .label(&self.name)
            .predicate(self.predicate())
            .run()?;
        StageMetrics::record_stage(
            &self.name,
            report.rows_read,
            report.rows_written,
            report.duration_secs,
        );
        Ok(StageReport::from_stream(&self.name, &self.config.source, report))
    }
}
