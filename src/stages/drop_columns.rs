use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::Result;
use crate::stages::{run_whole_table, Stage, StageReport};

/// Removes a fixed list of columns; names the table lacks are ignored.
#[derive(Debug)]
pub struct DropColumnsStage {
    name: String,
    source: PathBuf,
    destination: PathBuf,
    columns: Vec<String>,
}

impl DropColumnsStage {
    pub fn new<I, S>(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Stage for DropColumnsStage {
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
            let removed = table.drop_columns(&self.columns);
            if removed.len() < self.columns.len() {
                let absent: Vec<&String> = self
                    .columns
                    .iter()
                    .filter(|c| !removed.contains(c))
                    .collect();
                debug!(absent = ?absent, "Columns to drop were not present");
            }
            Ok(removed)
        })
    }
}
