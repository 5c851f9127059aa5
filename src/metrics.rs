//! Stage metrics
//!
//! Counters and histograms recorded by the streaming engine and the
//! whole-table stages. Recording is a no-op until a recorder is installed;
//! short-lived runs install the Prometheus recorder with [`init_metrics`] and
//! dump a text snapshot at exit with [`write_snapshot`].

use std::fs;
use std::path::Path;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::{Lazy, OnceCell};
use tracing::{info, warn};

use crate::error::Result;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Kind of a documented metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Catalog entry for a metric.
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

pub const ROWS_READ: &str = "off_stream_rows_read_total";
pub const ROWS_WRITTEN: &str = "off_stream_rows_written_total";
pub const MALFORMED_LINES: &str = "off_stream_malformed_total";
pub const CHUNKS: &str = "off_stream_chunks_total";
pub const CHUNK_ROWS: &str = "off_stream_chunk_rows";
pub const STAGE_ROWS_IN: &str = "off_stage_rows_in_total";
pub const STAGE_ROWS_OUT: &str = "off_stage_rows_out_total";
pub const STAGE_DURATION: &str = "off_stage_duration_seconds";

static CATALOG: Lazy<Vec<MetricDoc>> = Lazy::new(|| {
    vec![
        MetricDoc {
            name: ROWS_READ,
            metric_type: MetricType::Counter,
            help: "Well-formed data rows read from a streamed source",
            labels: vec!["stage"],
        },
        MetricDoc {
            name: ROWS_WRITTEN,
            metric_type: MetricType::Counter,
            help: "Rows appended to a streamed destination",
            labels: vec!["stage"],
        },
        MetricDoc {
            name: MALFORMED_LINES,
            metric_type: MetricType::Counter,
            help: "Source lines skipped because their field count did not match the header",
            labels: vec!["stage"],
        },
        MetricDoc {
            name: CHUNKS,
            metric_type: MetricType::Counter,
            help: "Chunks flushed to a streamed destination",
            labels: vec!["stage"],
        },
        MetricDoc {
            name: CHUNK_ROWS,
            metric_type: MetricType::Histogram,
            help: "Rows surviving the filter in each chunk",
            labels: vec!["stage"],
        },
        MetricDoc {
            name: STAGE_ROWS_IN,
            metric_type: MetricType::Counter,
            help: "Rows entering a stage",
            labels: vec!["stage"],
        },
        MetricDoc {
            name: STAGE_ROWS_OUT,
            metric_type: MetricType::Counter,
            help: "Rows written by a stage",
            labels: vec!["stage"],
        },
        MetricDoc {
            name: STAGE_DURATION,
            metric_type: MetricType::Histogram,
            help: "Wall-clock duration of a stage run in seconds",
            labels: vec!["stage"],
        },
    ]
});

/// Metric recording for pipeline stages
pub struct StageMetrics;

impl StageMetrics {
    /// Record one flushed chunk of a streamed stage
    pub fn record_chunk(stage: &str, rows_read: usize, rows_written: usize, malformed: usize) {
        let label = stage.to_string();
        ::metrics::counter!(ROWS_READ, "stage" => label.clone()).increment(rows_read as u64);
        ::metrics::counter!(ROWS_WRITTEN, "stage" => label.clone()).increment(rows_written as u64);
        ::metrics::counter!(MALFORMED_LINES, "stage" => label.clone()).increment(malformed as u64);
        ::metrics::counter!(CHUNKS, "stage" => label.clone()).increment(1);
        ::metrics::histogram!(CHUNK_ROWS, "stage" => label).record(rows_written as f64);
    }

    /// Record a finished stage run
    pub fn record_stage(stage: &str, rows_in: u64, rows_out: u64, duration_secs: f64) {
        let label = stage.to_string();
        ::metrics::counter!(STAGE_ROWS_IN, "stage" => label.clone()).increment(rows_in);
        ::metrics::counter!(STAGE_ROWS_OUT, "stage" => label.clone()).increment(rows_out);
        ::metrics::histogram!(STAGE_DURATION, "stage" => label).record(duration_secs);
    }

    pub fn metrics_documentation() -> &'static [MetricDoc] {
        &CATALOG
    }
}

/// Install the in-process Prometheus recorder. Idempotent.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            for doc in StageMetrics::metrics_documentation() {
                match doc.metric_type {
                    MetricType::Counter => ::metrics::describe_counter!(doc.name, doc.help),
                    MetricType::Histogram => ::metrics::describe_histogram!(doc.name, doc.help),
                }
            }
            let _ = HANDLE.set(handle);
            info!("Metrics recorder installed");
        }
        Err(e) => warn!("Failed to install metrics recorder: {}", e),
    }
}

/// Render the current metrics in Prometheus text format, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

/// Write the rendered snapshot to `path`. Does nothing without a recorder.
pub fn write_snapshot(path: &Path) -> Result<()> {
    if let Some(body) = render() {
        fs::write(path, body)?;
        info!(path = %path.display(), "Wrote metrics snapshot");
    }
    Ok(())
}
