//! Pipeline stages: two streamed extracts and the whole-table filters that
//! narrow their output.

pub mod drop_columns;
pub mod numeric;
pub mod streamed;
pub mod validity;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::*;
use crate::error::{EtlError, Result};
use crate::metrics::StageMetrics;
use crate::stream::StreamReport;
use crate::table::Table;

pub use drop_columns::DropColumnsStage;
pub use numeric::{NumericPresence, RequireNumericStage};
pub use streamed::StreamStage;
pub use validity::{ScoreFields, ScoreValidity, ScoreValidityStage, ValidityTokens};

/// The stages this crate knows how to build from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Extract,
    Countries,
    EnvValidity,
    NutriValidity,
    RequireScores,
    DropColumns,
}

impl StageKind {
    pub const ALL: [StageKind; 6] = [
        StageKind::Extract,
        StageKind::Countries,
        StageKind::EnvValidity,
        StageKind::NutriValidity,
        StageKind::RequireScores,
        StageKind::DropColumns,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Extract => EXTRACT_STAGE,
            StageKind::Countries => COUNTRIES_STAGE,
            StageKind::EnvValidity => ENV_VALIDITY_STAGE,
            StageKind::NutriValidity => NUTRI_VALIDITY_STAGE,
            StageKind::RequireScores => REQUIRE_SCORES_STAGE,
            StageKind::DropColumns => DROP_COLUMNS_STAGE,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        StageKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| EtlError::Config(format!("unknown stage '{s}'")))
    }
}

/// Outcome of one stage run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageReport {
    pub stage: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub rows_before: u64,
    pub rows_after: u64,
    pub columns: Vec<String>,
    /// Requested columns the source lacked, or columns removed by the stage.
    pub dropped_columns: Vec<String>,
    pub malformed_skipped: u64,
    pub chunks: Option<u64>,
    pub output_sha256: String,
    pub duration_secs: f64,
}

impl StageReport {
    pub fn from_stream(stage: &str, source: &Path, report: StreamReport) -> Self {
        Self {
            stage: stage.to_string(),
            source: source.to_path_buf(),
            destination: report.destination,
            rows_before: report.rows_read,
            rows_after: report.rows_written,
            columns: report.columns,
            dropped_columns: report.missing_columns,
            malformed_skipped: report.malformed_skipped,
            chunks: Some(report.chunks),
            output_sha256: report.output_sha256,
            duration_secs: report.duration_secs,
        }
    }

    /// One human-readable line for the console.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}: {} rows before, {} rows after -> {}",
            self.stage,
            self.rows_before,
            self.rows_after,
            self.destination.display()
        );
        if self.malformed_skipped > 0 {
            line.push_str(&format!(" ({} malformed lines skipped)", self.malformed_skipped));
        }
        line
    }
}

/// A single runnable extract step.
pub trait Stage {
    fn name(&self) -> &str;

    fn source(&self) -> &Path;

    fn destination(&self) -> &Path;

    fn run(&self) -> Result<StageReport>;
}

/// Load `source`, let `transform` mutate the table, then rebuild `destination`.
///
/// `transform` returns the columns it removed, if any, for the report.
pub(crate) fn run_whole_table<F>(
    stage: &str,
    source: &Path,
    destination: &Path,
    transform: F,
) -> Result<StageReport>
where
    F: FnOnce(&mut Table) -> Result<Vec<String>>,
{
    let started = Instant::now();
    let mut table = Table::read_csv(source)?;
    let rows_before = table.len() as u64;
    info!(stage, rows = rows_before, source = %source.display(), "Loaded table");

    let dropped_columns = transform(&mut table)?;
    let rows_after = table.len() as u64;

    let output_sha256 = table.write_csv(source, destination)?;
    let duration_secs = started.elapsed().as_secs_f64();
    StageMetrics::record_stage(stage, rows_before, rows_after, duration_secs);
    info!(
        stage,
        rows_before,
        rows_after,
        destination = %destination.display(),
        "Wrote table"
    );

    Ok(StageReport {
        stage: stage.to_string(),
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        rows_before,
        rows_after,
        columns: table.schema().columns().to_vec(),
        dropped_columns,
        malformed_skipped: 0,
        chunks: None,
        output_sha256,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_round_trip() {
        for kind in StageKind::ALL {
            assert_eq!(kind.name().parse::<StageKind>().unwrap(), kind);
        }
        assert!("nope".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_serde_names_match_cli_names() {
        for kind in StageKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }

    #[test]
    fn test_summary_mentions_malformed_lines() {
        let report = StageReport {
            stage: "countries".into(),
            source: "in.tsv".into(),
            destination: "out.csv".into(),
            rows_before: 10,
            rows_after: 4,
            columns: vec![],
            dropped_columns: vec![],
            malformed_skipped: 2,
            chunks: Some(1),
            output_sha256: String::new(),
            duration_secs: 0.0,
        };
        assert_eq!(
            report.summary(),
            "countries: 10 rows before, 4 rows after -> out.csv (2 malformed lines skipped)"
        );
    }
}
