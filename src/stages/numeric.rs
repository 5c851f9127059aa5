//! Drop rows where any required score fails strict numeric parsing.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::error::{EtlError, Result};
use crate::predicate::RowPredicate;
use crate::stages::{run_whole_table, Stage, StageReport};

/// Parse `raw` as a finite-or-infinite number; blank, garbage and NaN are missing.
pub fn coerce_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Accepts a row only when every listed column holds a number.
#[derive(Debug, Clone)]
pub struct NumericPresence {
    columns: Vec<String>,
}

impl NumericPresence {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl RowPredicate for NumericPresence {
    fn describe(&self) -> String {
        format!("{} all numeric", self.columns.join(", "))
    }

    fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    fn test(&self, values: &[Cow<'_, str>]) -> bool {
        values.iter().all(|v| coerce_number(v).is_some())
    }
}

/// Whole-table stage applying [`NumericPresence`].
#[derive(Debug)]
pub struct RequireNumericStage {
    name: String,
    source: PathBuf,
    destination: PathBuf,
    filter: NumericPresence,
}

impl RequireNumericStage {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        filter: NumericPresence,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            filter,
        }
    }
}

impl Stage for RequireNumericStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &Path {
        &self.source
    }

    fn destination(&self) -> &Path {
        &self.destination
    }

    #[instrument(skip(self), fields(stage = %self.name))]
    fn run(&self) -> Result<StageReport> {
        if self.filter.columns.is_empty() {
            return Err(EtlError::Config(format!(
                "{}: no columns to check",
                self.name
            )));
        }
        run_whole_table(&self.name, &self.source, &self.destination, |table| {
            if let Some(column) = self
                .filter
                .columns
                .iter()
                .find(|c| !table.schema().contains(c))
            {
                return Err(EtlError::MissingColumn {
                    column: column.clone(),
                    path: self.source.clone(),
                });
            }
            table.retain(&self.filter);
            Ok(Vec::new())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ENV_SCORE, NUTRI_SCORE};
    use crate::stages::validity::{ScoreFields, ScoreValidity, ValidityTokens};
    use crate::table::Table;
    use crate::types::{Schema, Value};

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number("12"), Some(12.0));
        assert_eq!(coerce_number(" -3.5 "), Some(-3.5));
        assert_eq!(coerce_number("1e2"), Some(100.0));
        assert_eq!(coerce_number(""), None);
        assert_eq!(coerce_number("unknown"), None);
        assert_eq!(coerce_number("NaN"), None);
        assert_eq!(coerce_number("12 kg"), None);
    }

    #[test]
    fn test_zero_is_a_number_not_missing() {
        assert_eq!(coerce_number("0"), Some(0.0));
    }

    #[test]
    fn test_and_semantics_versus_validity_or() {
        let schema = Schema::new(vec![
            ENV_SCORE.into(),
            "environmental_score_grade".into(),
            NUTRI_SCORE.into(),
        ]);
        let row = vec![
            Value::from_field("unknown"),
            Value::from_field("b"),
            Value::from_field("4"),
        ];

        let mut validity = Table::new(schema.clone(), vec![row.clone()]);
        validity.retain(&ScoreValidity::new(
            ScoreFields::environmental(),
            ValidityTokens::default(),
        ));
        assert_eq!(validity.len(), 1);

        let mut numeric = Table::new(schema, vec![row]);
        numeric.retain(&NumericPresence::new([ENV_SCORE, NUTRI_SCORE]));
        assert_eq!(numeric.len(), 0);
    }

    #[test]
    fn test_either_missing_drops_row() {
        let schema = Schema::new(vec![ENV_SCORE.into(), NUTRI_SCORE.into()]);
        let rows = vec![
            vec![Value::from_field("1"), Value::from_field("2")],
            vec![Value::from_field("1"), Value::Missing],
            vec![Value::Missing, Value::from_field("2")],
        ];
        let mut table = Table::new(schema, rows);
        assert_eq!(table.retain(&NumericPresence::new([ENV_SCORE, NUTRI_SCORE])), 2);
        assert_eq!(table.len(), 1);
    }
}
