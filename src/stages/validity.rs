//! Keep rows whose score or grade carries information.
//!
//! One routine serves both the environmental score and the nutri-score; only
//! the column names differ.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::constants::{
    ENV_GRADE, ENV_SCORE, INVALID_SCORE_TOKENS, NUTRI_GRADE, NUTRI_SCORE, VALID_GRADES,
};
use crate::error::Result;
use crate::predicate::RowPredicate;
use crate::stages::{run_whole_table, Stage, StageReport};

/// The score/grade column pair checked by a validity filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreFields {
    pub score_column: String,
    pub grade_column: String,
}

impl ScoreFields {
    pub fn new(score_column: impl Into<String>, grade_column: impl Into<String>) -> Self {
        Self {
            score_column: score_column.into(),
            grade_column: grade_column.into(),
        }
    }

    pub fn environmental() -> Self {
        Self::new(ENV_SCORE, ENV_GRADE)
    }

    pub fn nutrition() -> Self {
        Self::new(NUTRI_SCORE, NUTRI_GRADE)
    }
}

/// Token sets, stored normalized (trimmed, lowercase).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityTokens {
    invalid: Vec<String>,
    grades: Vec<String>,
}

impl ValidityTokens {
    pub fn new<I, J, S, T>(invalid: I, grades: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            invalid: invalid.into_iter().map(|s| normalize(s.as_ref())).collect(),
            grades: grades.into_iter().map(|s| normalize(s.as_ref())).collect(),
        }
    }

    pub fn is_usable_score(&self, raw: &str) -> bool {
        let value = normalize(raw);
        !self.invalid.iter().any(|t| *t == value)
    }

    pub fn is_valid_grade(&self, raw: &str) -> bool {
        let value = normalize(raw);
        self.grades.iter().any(|g| *g == value)
    }
}

impl Default for ValidityTokens {
    fn default() -> Self {
        Self::new(INVALID_SCORE_TOKENS, VALID_GRADES)
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Accepts a row when the score is usable OR the grade is a known grade.
#[derive(Debug, Clone)]
pub struct ScoreValidity {
    fields: ScoreFields,
    tokens: ValidityTokens,
}

impl ScoreValidity {
    pub fn new(fields: ScoreFields, tokens: ValidityTokens) -> Self {
        Self { fields, tokens }
    }

    pub fn fields(&self) -> &ScoreFields {
        &self.fields
    }

    pub fn accepts(&self, score: &str, grade: &str) -> bool {
        self.tokens.is_usable_score(score) || self.tokens.is_valid_grade(grade)
    }
}

impl RowPredicate for ScoreValidity {
    fn describe(&self) -> String {
        format!(
            "{} usable or {} graded",
            self.fields.score_column, self.fields.grade_column
        )
    }

    fn columns(&self) -> Vec<&str> {
        vec![
            self.fields.score_column.as_str(),
            self.fields.grade_column.as_str(),
        ]
    }

    fn test(&self, values: &[Cow<'_, str>]) -> bool {
        match values {
            [score, grade] => self.accepts(score, grade),
            _ => false,
        }
    }
}

/// Whole-table stage applying a [`ScoreValidity`] filter.
#[derive(Debug)]
pub struct ScoreValidityStage {
    name: String,
    source: PathBuf,
    destination: PathBuf,
    filter: ScoreValidity,
}

impl ScoreValidityStage {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        filter: ScoreValidity,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            filter,
        }
    }
}

impl Stage for ScoreValidityStage {
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
        run_whole_table(&self.name, &self.source, &self.destination, |table| {
            table.retain(&self.filter);
            Ok(Vec::new())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use crate::types::{Schema, Value};

    fn env_filter() -> ScoreValidity {
        ScoreValidity::new(ScoreFields::environmental(), ValidityTokens::default())
    }

    fn text(s: &str) -> Value {
        Value::from_field(s)
    }

    #[test]
    fn test_score_or_grade_is_enough() {
        let f = env_filter();
        assert!(f.accepts("", "b"));
        assert!(f.accepts("12", ""));
        assert!(f.accepts("unknown", "B"));
        assert!(f.accepts("not-applicable", ""));
        assert!(!f.accepts("", "z"));
        assert!(!f.accepts(" NaN ", "unknown"));
        assert!(!f.accepts("null", " "));
        assert!(!f.accepts("None", ""));
    }

    #[test]
    fn test_end_to_end_rows() {
        let schema = Schema::new(vec![
            "name".into(),
            ENV_SCORE.into(),
            ENV_GRADE.into(),
        ]);
        let rows = vec![
            vec![text("A"), text(""), text("b")],
            vec![text("B"), text("12"), text("")],
            vec![text("C"), text(""), text("z")],
        ];
        let mut table = Table::new(schema, rows);

        table.retain(&env_filter());

        let names: Vec<_> = table.column("name").unwrap().map(Value::text).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_absent_grade_column_reads_as_missing() {
        let schema = Schema::new(vec![NUTRI_SCORE.into()]);
        let rows = vec![vec![text("3")], vec![text("unknown")]];
        let mut table = Table::new(schema, rows);

        let nutri = ScoreValidity::new(ScoreFields::nutrition(), ValidityTokens::default());
        assert_eq!(table.retain(&nutri), 1);
        assert_eq!(table.rows()[0], vec![text("3")]);
    }

    #[test]
    fn test_custom_tokens_are_normalized() {
        let tokens = ValidityTokens::new([" N/A "], ["A+", "a"]);
        assert!(!tokens.is_usable_score("n/a"));
        assert!(tokens.is_usable_score(""));
        assert!(tokens.is_valid_grade("a+"));
    }
}
