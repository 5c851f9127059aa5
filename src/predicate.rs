//! Row predicates and their schema binding.
//!
//! A predicate names the columns it reads; [`BoundPredicate::bind`] resolves
//! those names against a schema once, so per-row evaluation is positional.
//! Absent columns and blank fields read as `""` and never fail.

use std::borrow::Cow;
use std::fmt;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::{EtlError, Result};
use crate::types::{Fields, Schema};

pub trait RowPredicate: fmt::Debug {
    /// Short label for logs and reports.
    fn describe(&self) -> String;

    /// Columns read by [`RowPredicate::test`], in the order values are passed.
    fn columns(&self) -> Vec<&str>;

    /// Decide a row from the field texts of `columns()`.
    fn test(&self, values: &[Cow<'_, str>]) -> bool;

    /// Whether the whole filter is switched off when a column it reads is
    /// absent from the schema (instead of reading `""` for every row).
    fn disable_when_absent(&self) -> bool {
        false
    }
}

/// A predicate with its columns resolved to positions in one schema.
#[derive(Debug)]
pub struct BoundPredicate<'p> {
    predicate: &'p dyn RowPredicate,
    indices: Vec<Option<usize>>,
}

impl<'p> BoundPredicate<'p> {
    /// Returns `None` when the predicate opts out because its input column is absent.
    pub fn bind(predicate: &'p dyn RowPredicate, schema: &Schema) -> Option<Self> {
        let indices: Vec<Option<usize>> = predicate
            .columns()
            .into_iter()
            .map(|name| schema.index_of(name))
            .collect();

        if indices.iter().any(Option::is_none) && predicate.disable_when_absent() {
            warn!(
                predicate = %predicate.describe(),
                "Filter column not present in schema; filter not applied"
            );
            return None;
        }

        Some(Self { predicate, indices })
    }

    pub fn matches<F: Fields + ?Sized>(&self, row: &F) -> bool {
        let values: Vec<Cow<'_, str>> = self
            .indices
            .iter()
            .map(|index| match index {
                Some(i) => row.text(*i),
                None => Cow::Borrowed(""),
            })
            .collect();
        self.predicate.test(&values)
    }
}

/// Keeps rows whose country list mentions any allowed country.
///
/// Matching is a case-insensitive substring search where whitespace inside a
/// phrase matches any run of whitespace, so `"United States"` also matches
/// `"united   states"`. A phrase embedded in a longer name still matches
/// (`"India"` matches `"Indiana"`), but a misspelling that breaks the phrase
/// does not (`"Canada"` does not match `"Canadia"`).
#[derive(Debug, Clone)]
pub struct CountryMatch {
    column: String,
    countries: Vec<String>,
    pattern: Regex,
}

impl CountryMatch {
    pub fn new<I, S>(column: impl Into<String>, countries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let countries: Vec<String> = countries
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| !c.trim().is_empty())
            .collect();
        if countries.is_empty() {
            return Err(EtlError::Config(
                "country filter needs at least one country".to_string(),
            ));
        }

        let alternation = countries
            .iter()
            .map(|c| phrase_pattern(c))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
            .map_err(|e| EtlError::Config(format!("invalid country pattern: {e}")))?;

        Ok(Self {
            column: column.into(),
            countries,
            pattern,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn is_match(&self, field: &str) -> bool {
        self.pattern.is_match(field)
    }
}

fn phrase_pattern(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

impl RowPredicate for CountryMatch {
    fn describe(&self) -> String {
        format!("{} mentions one of {} countries", self.column, self.countries.len())
    }

    fn columns(&self) -> Vec<&str> {
        vec![self.column.as_str()]
    }

    fn test(&self, values: &[Cow<'_, str>]) -> bool {
        values.first().map(|v| self.is_match(v)).unwrap_or(false)
    }

    fn disable_when_absent(&self) -> bool {
        true
    }
}
