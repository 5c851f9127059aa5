use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Source file has no header row: {}", path.display())]
    EmptySource { path: PathBuf },

    #[error("Destination is not writable: {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Column '{column}' not present in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("Malformed record at line {line}: expected {expected} fields, found {found}")]
    MalformedRecord {
        line: u64,
        expected: usize,
        found: usize,
    },
}

impl EtlError {
    /// True for errors caused by paths or settings rather than by the data itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EtlError::Config(_)
                | EtlError::Toml(_)
                | EtlError::SourceNotFound { .. }
                | EtlError::EmptySource { .. }
                | EtlError::DestinationUnwritable { .. }
                | EtlError::MissingColumn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_not_found_names_the_path() {
        let err = EtlError::SourceNotFound {
            path: PathBuf::from("/data/products.csv"),
        };
        assert_eq!(err.to_string(), "Source file not found: /data/products.csv");
        assert!(err.is_configuration());
    }

    #[test]
    fn malformed_record_is_not_a_configuration_error() {
        let err = EtlError::MalformedRecord {
            line: 7,
            expected: 3,
            found: 4,
        };
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("line 7"));
    }
}
