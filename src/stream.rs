//! Chunked filter/project over a large delimited source.
//!
//! The source is read in chunks of at most `chunk_size` records. Each chunk is
//! projected to the requested columns, filtered, appended to the destination
//! and flushed to disk before the next chunk is read, so memory stays bounded
//! by the chunk size and already-written chunks survive an interrupted run.

use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use csv::{ByteRecord, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_DELIMITER};
use crate::error::{EtlError, Result};
use crate::metrics::StageMetrics;
use crate::output::{open_source, prepare_destination, sha256_file};
use crate::predicate::{BoundPredicate, RowPredicate};
use crate::projection::ColumnProjection;
use crate::types::Schema;

const READ_BUFFER_BYTES: usize = 1 << 20;
const WRITE_BUFFER_BYTES: usize = 1 << 16;
// Upper bound on records preallocated for the first chunk
const PREALLOC_RECORDS: usize = 4_096;

/// Whether quote characters delimit fields or are plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quoting {
    #[default]
    Disabled,
    Enabled,
}

/// What to do with a line whose field count differs from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    #[default]
    Skip,
    Fail,
}

/// Settings for one streamed run.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub delimiter: u8,
    pub quoting: Quoting,
    pub chunk_size: usize,
    pub keep_columns: Vec<String>,
    pub malformed_lines: MalformedLinePolicy,
}

impl StreamConfig {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            delimiter: DEFAULT_DELIMITER as u8,
            quoting: Quoting::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            keep_columns: Vec::new(),
            malformed_lines: MalformedLinePolicy::default(),
        }
    }

    pub fn keep_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }

    pub fn malformed_lines(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_lines = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EtlError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.keep_columns.is_empty() {
            return Err(EtlError::Config(
                "keep_columns must name at least one column".to_string(),
            ));
        }
        if matches!(self.delimiter, b'\n' | b'\r') {
            return Err(EtlError::Config(
                "delimiter cannot be a line terminator".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counts and identity of a finished streamed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamReport {
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_filtered: u64,
    pub malformed_skipped: u64,
    pub chunks: u64,
    pub columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub filter_applied: bool,
    pub destination: PathBuf,
    pub output_sha256: String,
    pub duration_secs: f64,
}

/// Runs the chunked filter/project for one stage.
pub struct ChunkedFilterProject<'a> {
    label: &'a str,
    config: &'a StreamConfig,
    predicate: Option<&'a dyn RowPredicate>,
}

impl<'a> ChunkedFilterProject<'a> {
    pub fn new(config: &'a StreamConfig) -> Self {
        Self {
            label: "stream",
            config,
            predicate: None,
        }
    }

    /// Name used in logs and metric labels.
    pub fn label(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }

    pub fn predicate(mut self, predicate: Option<&'a dyn RowPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    #[instrument(skip(self), fields(stage = %self.label, source = %self.config.source.display()))]
    pub fn run(&self) -> Result<StreamReport> {
        let config = self.config;
        config.validate()?;
        let started = Instant::now();

        let source = open_source(&config.source)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(config.delimiter)
            .quoting(config.quoting == Quoting::Enabled)
            .has_headers(true)
            .flexible(true)
            .buffer_capacity(READ_BUFFER_BYTES)
            .from_reader(BufReader::with_capacity(READ_BUFFER_BYTES, source));

        let header = reader.byte_headers()?.clone();
        if header.is_empty() {
            return Err(EtlError::EmptySource {
                path: config.source.clone(),
            });
        }
        let schema = Schema::from_byte_record(&header);
        let expected_fields = schema.len();

        let projection = ColumnProjection::new(config.keep_columns.iter().cloned()).resolve(&schema);
        if projection.is_empty() {
            return Err(EtlError::Config(format!(
                "none of the requested columns are present in {}",
                config.source.display()
            )));
        }
        let bound = self
            .predicate
            .and_then(|p| BoundPredicate::bind(p, projection.schema()));

        info!(
            columns = projection.schema().len(),
            missing = projection.missing().len(),
            filter = bound.is_some(),
            chunk_size = config.chunk_size,
            "Starting chunked filter/project"
        );

        // Source and header are good; only now is the previous output discarded
        let destination = prepare_destination(&config.source, &config.destination)?;
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .buffer_capacity(WRITE_BUFFER_BYTES)
            .from_writer(destination);
        writer.write_record(projection.schema().columns())?;
        writer.flush()?;

        let mut report = StreamReport {
            columns: projection.schema().columns().to_vec(),
            missing_columns: projection.missing().to_vec(),
            filter_applied: bound.is_some(),
            destination: config.destination.clone(),
            ..StreamReport::default()
        };

        let mut chunk: Vec<ByteRecord> =
            Vec::with_capacity(config.chunk_size.min(PREALLOC_RECORDS));
        let mut projected = ByteRecord::new();

        loop {
            let fill = fill_chunk(
                &mut reader,
                &mut chunk,
                config.chunk_size,
                expected_fields,
                config.malformed_lines,
            )?;
            report.malformed_skipped += fill.malformed as u64;

            if fill.rows > 0 {
                let mut written = 0usize;
                for record in &chunk[..fill.rows] {
                    projection.project_into(record, &mut projected);
                    if let Some(ref bound) = bound {
                        if !bound.matches(&projected) {
                            continue;
                        }
                    }
                    writer.write_byte_record(&projected)?;
                    written += 1;
                }
                writer.flush()?;
                writer.get_ref().sync_data()?;

                report.chunks += 1;
                report.rows_read += fill.rows as u64;
                report.rows_written += written as u64;
                StageMetrics::record_chunk(self.label, fill.rows, written, fill.malformed);
                debug!(
                    chunk = report.chunks,
                    rows = fill.rows,
                    written,
                    malformed = fill.malformed,
                    "Flushed chunk"
                );
            }

            if fill.exhausted {
                break;
            }
        }

        drop(writer);
        report.rows_filtered = report.rows_read - report.rows_written;
        report.output_sha256 = sha256_file(&config.destination)?;
        report.duration_secs = started.elapsed().as_secs_f64();

        if report.malformed_skipped > 0 {
            warn!(
                malformed = report.malformed_skipped,
                "Skipped lines whose field count did not match the header"
            );
        }
        info!(
            rows_read = report.rows_read,
            rows_written = report.rows_written,
            chunks = report.chunks,
            destination = %config.destination.display(),
            "Finished chunked filter/project"
        );
        Ok(report)
    }
}

/// Convenience wrapper for a single run.
pub fn filter_project(
    config: &StreamConfig,
    predicate: Option<&dyn RowPredicate>,
) -> Result<StreamReport> {
    ChunkedFilterProject::new(config).predicate(predicate).run()
}

struct ChunkFill {
    rows: usize,
    malformed: usize,
    exhausted: bool,
}

/// Read up to `chunk_size` well-formed records into `chunk`, reusing its
/// allocations. Malformed records do not count toward the chunk size.
fn fill_chunk<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    chunk: &mut Vec<ByteRecord>,
    chunk_size: usize,
    expected_fields: usize,
    policy: MalformedLinePolicy,
) -> Result<ChunkFill> {
    let mut rows = 0usize;
    let mut malformed = 0usize;

    while rows < chunk_size {
        if rows == chunk.len() {
            chunk.push(ByteRecord::new());
        }
        let record = &mut chunk[rows];
        if !reader.read_byte_record(record)? {
            return Ok(ChunkFill {
                rows,
                malformed,
                exhausted: true,
            });
        }
        if record.len() != expected_fields {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            match policy {
                MalformedLinePolicy::Skip => {
                    malformed += 1;
                    continue;
                }
                MalformedLinePolicy::Fail => {
                    return Err(EtlError::MalformedRecord {
                        line,
                        expected: expected_fields,
                        found: record.len(),
                    });
                }
            }
        }
        rows += 1;
    }

    Ok(ChunkFill {
        rows,
        malformed,
        exhausted: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::CountryMatch;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const SOURCE: &str = "code\tproduct_name\tcountries_en\tnutriscore_grade\n\
        1\tOats\tUnited States\ta\n\
        2\tBrie\tFrance\td\n\
        3\tTea\tUnited Kingdom,France\tb\n\
        4\tbroken line\n\
        5\tJam \"Deluxe\"\tCanada\tc\n";

    fn write_source(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("products.tsv");
        fs::write(&path, body).unwrap();
        path
    }

    fn config(dir: &TempDir, source: PathBuf) -> StreamConfig {
        StreamConfig::new(source, dir.path().join("out.csv"))
            .keep_columns(["product_name", "countries_en", "not_in_export"])
    }

    #[test]
    fn test_projects_in_requested_order_and_skips_malformed() {
        let dir = tempdir().unwrap();
        let source = write_source(&dir, SOURCE);
        let cfg = config(&dir, source);

        let report = filter_project(&cfg, None).unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_written, 4);
        assert_eq!(report.malformed_skipped, 1);
        assert_eq!(report.missing_columns, vec!["not_in_export".to_string()]);
        assert_eq!(
            fs::read_to_string(&cfg.destination).unwrap(),
            "product_name,countries_en\n\
             Oats,United States\n\
             Brie,France\n\
             Tea,\"United Kingdom,France\"\n\
             \"Jam \"\"Deluxe\"\"\",Canada\n"
        );
    }

    #[test]
    fn test_country_filter_applied_per_chunk() {
        let dir = tempdir().unwrap();
        let source = write_source(&dir, SOURCE);
        let cfg = config(&dir, source).chunk_size(1);
        let countries = CountryMatch::new("countries_en", ["United Kingdom", "Canada"]).unwrap();

        let report = filter_project(&cfg, Some(&countries)).unwrap();

        assert!(report.filter_applied);
        assert_eq!(report.chunks, 4);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.rows_filtered, 2);
        let out = fs::read_to_string(&cfg.destination).unwrap();
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains("Tea,"));
        assert!(out.contains("Canada"));
    }

    #[test]
    fn test_fail_policy_aborts_on_malformed_line() {
        let dir = tempdir().unwrap();
        let source = write_source(&dir, SOURCE);
        let cfg = config(&dir, source).malformed_lines(MalformedLinePolicy::Fail);

        let err = filter_project(&cfg, None).unwrap_err();
        match err {
            EtlError::MalformedRecord { line, expected, found } => {
                assert_eq!(line, 5);
                assert_eq!(expected, 4);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_only_source_writes_header() {
        let dir = tempdir().unwrap();
        let source = write_source(&dir, "product_name\tcountries_en\n");
        let cfg = config(&dir, source);

        let report = filter_project(&cfg, None).unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(
            fs::read_to_string(&cfg.destination).unwrap(),
            "product_name,countries_en\n"
        );
    }

    #[test]
    fn test_empty_source_is_an_error() {
        let dir = tempdir().unwrap();
        let source = write_source(&dir, "");
        let cfg = config(&dir, source);
        assert!(matches!(
            filter_project(&cfg, None),
            Err(EtlError::EmptySource { .. })
        ));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let dir = tempdir().unwrap();
        let source = write_source(&dir, SOURCE);
        let cfg = config(&dir, source).chunk_size(0);
        assert!(matches!(filter_project(&cfg, None), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_no_requested_column_present() {
        let dir = tempdir().unwrap();
        let source = write_source(&dir, SOURCE);
        let cfg = StreamConfig::new(source, dir.path().join("out.csv")).keep_columns(["x", "y"]);
        assert!(matches!(filter_project(&cfg, None), Err(EtlError::Config(_))));
        assert!(!cfg.destination.exists());
    }
}
