//! Column projection resolved once against a discovered schema.

use csv::ByteRecord;
use tracing::debug;

use crate::types::Schema;

/// Ordered list of columns a stage wants to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnProjection {
    requested: Vec<String>,
}

impl ColumnProjection {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut requested: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if !requested.contains(&column) {
                requested.push(column);
            }
        }
        Self { requested }
    }

    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    /// Intersect with `schema`, keeping the requested order. Unknown columns
    /// are dropped and listed in [`ResolvedProjection::missing`].
    ///
    /// Resolution itself never fails. An empty intersection is the one case
    /// the streaming engine rejects, with `EtlError::Config`, before the
    /// destination is touched.
    pub fn resolve(&self, schema: &Schema) -> ResolvedProjection {
        let mut columns = Vec::with_capacity(self.requested.len());
        let mut indices = Vec::with_capacity(self.requested.len());
        let mut missing = Vec::new();

        for name in &self.requested {
            match schema.index_of(name) {
                Some(index) => {
                    columns.push(name.clone());
                    indices.push(index);
                }
                None => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            debug!(missing = ?missing, "Requested columns not present in source");
        }

        ResolvedProjection {
            schema: Schema::new(columns),
            indices,
            missing,
        }
    }
}

/// A projection bound to source column positions.
#[derive(Debug, Clone)]
pub struct ResolvedProjection {
    schema: Schema,
    indices: Vec<usize>,
    missing: Vec<String>,
}

impl ResolvedProjection {
    /// Schema of the projected rows.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Copy the projected fields of `source` into `out`, replacing its contents.
    pub fn project_into(&self, source: &ByteRecord, out: &mut ByteRecord) {
        out.clear();
        for &index in &self.indices {
            out.push_field(source.get(index).unwrap_or(b""));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(cols: &[&str]) -> Schema {
        Schema::new(cols.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_resolve_keeps_requested_order() {
        let projection = ColumnProjection::new(["c", "a"]);
        let resolved = projection.resolve(&schema(&["a", "b", "c"]));

        assert_eq!(resolved.schema().columns(), &["c".to_string(), "a".to_string()]);
        assert_eq!(resolved.indices(), &[2, 0]);
        assert!(resolved.missing().is_empty());
    }

    #[test]
    fn test_resolve_drops_unknown_columns() {
        let projection = ColumnProjection::new(["a", "zzz", "b"]);
        let resolved = projection.resolve(&schema(&["b", "a"]));

        assert_eq!(resolved.schema().columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(resolved.missing(), &["zzz".to_string()]);
    }

    #[test]
    fn test_duplicate_requests_are_collapsed() {
        let projection = ColumnProjection::new(["a", "a", "b"]);
        assert_eq!(projection.requested().len(), 2);
    }

    #[test]
    fn test_project_into_copies_fields() {
        let resolved = ColumnProjection::new(["b"]).resolve(&schema(&["a", "b"]));
        let source = ByteRecord::from(vec!["1", "2"]);
        let mut out = ByteRecord::new();
        resolved.project_into(&source, &mut out);
        assert_eq!(out, ByteRecord::from(vec!["2"]));
    }
}
