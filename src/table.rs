//! Whole-table load/transform/write for the smaller intermediate extracts.

use std::io::BufReader;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Terminator, WriterBuilder};
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::output::{open_source, prepare_destination, sha256_file};
use crate::predicate::{BoundPredicate, RowPredicate};
use crate::types::{Row, Schema, Value};

/// An in-memory table read from a comma-separated file with a header row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    schema: Schema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    /// Load a standard CSV file. Short rows are padded with `Missing`; a row
    /// with more fields than the header is an error.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = open_source(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let header = reader.byte_headers()?.clone();
        if header.is_empty() {
            return Err(EtlError::EmptySource {
                path: path.to_path_buf(),
            });
        }
        let schema = Schema::from_byte_record(&header);
        let width = schema.len();

        let mut rows = Vec::new();
        let mut record = ByteRecord::new();
        while reader.read_byte_record(&mut record)? {
            if record.len() > width {
                return Err(EtlError::MalformedRecord {
                    line: record.position().map(|p| p.line()).unwrap_or(0),
                    expected: width,
                    found: record.len(),
                });
            }
            let mut row: Row = record.iter().map(Value::from_bytes).collect();
            row.resize(width, Value::Missing);
            rows.push(row);
        }

        debug!(path = %path.display(), rows = rows.len(), columns = width, "Loaded table");
        Ok(Self { schema, rows })
    }

    /// Replace any existing file at `destination` with this table and return
    /// the SHA-256 of what was written.
    pub fn write_csv(&self, source: &Path, destination: &Path) -> Result<String> {
        let file = prepare_destination(source, destination)?;
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);

        writer.write_record(self.schema.columns())?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Value::as_bytes))?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;
        drop(writer);

        sha256_file(destination)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, or `None` if the schema lacks it.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let index = self.schema.index_of(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    /// Keep only rows the predicate accepts; returns how many were removed.
    pub fn retain(&mut self, predicate: &dyn RowPredicate) -> usize {
        let before = self.rows.len();
        if let Some(bound) = BoundPredicate::bind(predicate, &self.schema) {
            self.rows.retain(|row| bound.matches(row.as_slice()));
        }
        before - self.rows.len()
    }

    /// Remove the named columns that exist; returns the names actually removed.
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<String> {
        let mut removed = Vec::new();
        for name in names {
            // Remove every occurrence so duplicated headers do not linger
            while let Some(index) = self.schema.index_of(name.as_ref()) {
                removed.push(self.schema.remove(index));
                for row in &mut self.rows {
                    row.remove(index);
                }
            }
        }
        removed.dedup();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::CountryMatch;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_pads_short_rows_and_marks_blanks_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "a,b,c\n1,,3\n4\n").unwrap();

        let table = Table::read_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][1], Value::Missing);
        assert_eq!(
            table.rows()[1],
            vec![Value::Text("4".into()), Value::Missing, Value::Missing]
        );
    }

    #[test]
    fn test_read_rejects_overlong_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "a,b\n1,2,3\n").unwrap();
        assert!(matches!(
            Table::read_csv(&path),
            Err(EtlError::MalformedRecord { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn test_write_round_trips_quoted_fields() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.csv");
        let dst = dir.path().join("out.csv");
        let body = "name,countries_en\n\"Jam \"\"Deluxe\"\"\",\"Canada,France\"\nTea,\n";
        fs::write(&src, body).unwrap();

        let table = Table::read_csv(&src).unwrap();
        table.write_csv(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), body);
    }

    #[test]
    fn test_write_keeps_invalid_utf8_bytes() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.csv");
        let dst = dir.path().join("out.csv");
        let body: &[u8] = b"name,brand\nCr\xe8me,Lait\n";
        fs::write(&src, body).unwrap();

        let table = Table::read_csv(&src).unwrap();
        table.write_csv(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), body);
    }

    #[test]
    fn test_drop_columns_ignores_absent_names() {
        let schema = Schema::new(vec!["a".into(), "b".into(), "c".into()]);
        let rows = vec![vec![
            Value::Text("1".into()),
            Value::Text("2".into()),
            Value::Text("3".into()),
        ]];
        let mut table = Table::new(schema, rows);

        let removed = table.drop_columns(&["b", "zzz"]);
        assert_eq!(removed, vec!["b".to_string()]);
        assert_eq!(table.schema().columns(), &["a".to_string(), "c".to_string()]);
        assert_eq!(table.rows()[0], vec![Value::Text("1".into()), Value::Text("3".into())]);
    }

    #[test]
    fn test_retain_with_country_predicate() {
        let schema = Schema::new(vec!["countries_en".into()]);
        let rows = vec![
            vec![Value::Text("Ireland".into())],
            vec![Value::Missing],
            vec![Value::Text("Spain".into())],
        ];
        let mut table = Table::new(schema, rows);
        let pred = CountryMatch::new("countries_en", ["Ireland"]).unwrap();

        assert_eq!(table.retain(&pred), 2);
        assert_eq!(table.len(), 1);
        let values: Vec<_> = table.column("countries_en").unwrap().map(Value::text).collect();
        assert_eq!(values, vec!["Ireland"]);
    }
}
