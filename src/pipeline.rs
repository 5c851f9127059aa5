use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::config::{AppConfig, StageOverride};
use crate::constants::*;
use crate::error::Result;
use crate::predicate::CountryMatch;
use crate::stages::{
    DropColumnsStage, NumericPresence, RequireNumericStage, ScoreFields, ScoreValidity,
    ScoreValidityStage, Stage, StageKind, StageReport, StreamStage, ValidityTokens,
};
use crate::stream::StreamConfig;

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

/// Build the stage `kind` from configuration, with default paths and column
/// lists unless overridden under `[stages.<name>]`.
pub fn build_stage(config: &AppConfig, kind: StageKind) -> Result<Box<dyn Stage>> {
    let empty = StageOverride::default();
    let over = config.stage_override(kind).unwrap_or(&empty);
    let name = kind.name();

    let path = |overridden: &Option<PathBuf>, default: &Path| {
        config.resolve(overridden.as_deref().unwrap_or(default))
    };
    let columns = |defaults: &[&str]| {
        over.columns
            .clone()
            .unwrap_or_else(|| to_owned_list(defaults))
    };
    let tokens = || {
        ValidityTokens::new(&config.validity.invalid_tokens, &config.validity.grades)
    };
    let score_fields = |defaults: ScoreFields| {
        ScoreFields::new(
            over.score_column.clone().unwrap_or(defaults.score_column),
            over.grade_column.clone().unwrap_or(defaults.grade_column),
        )
    };

    let stage: Box<dyn Stage> = match kind {
        StageKind::Extract | StageKind::Countries => {
            let (output, keep) = if kind == StageKind::Extract {
                (EXTRACT_OUTPUT, EXTRACT_COLUMNS)
            } else {
                (COUNTRIES_OUTPUT, COUNTRIES_COLUMNS)
            };
            let stream = StreamConfig {
                source: path(&over.source, config.source.as_path()),
                destination: path(&over.destination, Path::new(output)),
                delimiter: config.stream.delimiter_byte()?,
                quoting: config.stream.quoting,
                chunk_size: config.stream.chunk_size,
                keep_columns: columns(keep),
                malformed_lines: config.stream.malformed_lines,
            };
            let stage = StreamStage::new(name, stream);
            if kind == StageKind::Countries {
                let countries =
                    CountryMatch::new(&config.countries.column, &config.countries.allow)?;
                Box::new(stage.with_predicate(Box::new(countries)))
            } else {
                Box::new(stage)
            }
        }
        StageKind::EnvValidity => Box::new(ScoreValidityStage::new(
            name,
            path(&over.source, Path::new(COUNTRIES_OUTPUT)),
            path(&over.destination, Path::new(ENV_VALIDITY_OUTPUT)),
            ScoreValidity::new(score_fields(ScoreFields::environmental()), tokens()),
        )),
        StageKind::NutriValidity => Box::new(ScoreValidityStage::new(
            name,
            path(&over.source, Path::new(ENV_VALIDITY_OUTPUT)),
            path(&over.destination, Path::new(NUTRI_VALIDITY_OUTPUT)),
            ScoreValidity::new(score_fields(ScoreFields::nutrition()), tokens()),
        )),
        StageKind::RequireScores => Box::new(RequireNumericStage::new(
            name,
            path(&over.source, Path::new(NUTRI_VALIDITY_OUTPUT)),
            path(&over.destination, Path::new(REQUIRE_SCORES_OUTPUT)),
            NumericPresence::new(columns(REQUIRED_NUMERIC_COLUMNS)),
        )),
        StageKind::DropColumns => Box::new(DropColumnsStage::new(
            name,
            path(&over.source, Path::new(NUTRI_VALIDITY_OUTPUT)),
            path(&over.destination, Path::new(DROP_COLUMNS_OUTPUT)),
            columns(REDUNDANT_COLUMNS),
        )),
    };
    Ok(stage)
}

/// Runs configured stages one after another, each reading the previous
/// stage's file from disk.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::with_stages(config, &config.pipeline.stages)
    }

    pub fn with_stages(config: &AppConfig, kinds: &[StageKind]) -> Result<Self> {
        let stages = kinds
            .iter()
            .map(|kind| build_stage(config, *kind))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, stopping at the first failure.
    pub fn run(&self) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("pipeline", run_id = %run_id);
        let _enter = span.enter();
        info!(stages = self.stages.len(), "Starting pipeline");

        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            match stage.run() {
                Ok(report) => {
                    info!("{}", report.summary());
                    reports.push(report);
                }
                Err(e) => {
                    error!(stage = stage.name(), "Stage failed: {}", e);
                    return Err(e);
                }
            }
        }

        let finished_at = Utc::now();
        info!(
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Pipeline finished"
        );
        Ok(PipelineResult {
            run_id,
            started_at,
            finished_at,
            stages: reports,
        })
    }
}
