use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{EtlError, Result};
use crate::stages::StageKind;
use crate::stream::{MalformedLinePolicy, Quoting};

/// Top-level configuration, read from `off_extract.toml`.
///
/// Every key is optional; omitted keys fall back to the defaults in
/// [`crate::constants`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Base directory for relative paths.
    pub data_dir: PathBuf,
    /// The raw export read by streamed stages.
    pub source: PathBuf,
    pub stream: StreamSettings,
    pub countries: CountrySettings,
    pub validity: ValiditySettings,
    pub pipeline: PipelineSettings,
    /// Per-stage overrides keyed by stage name (`countries`, `env-validity`, ...).
    pub stages: HashMap<String, StageOverride>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamSettings {
    pub delimiter: char,
    pub quoting: Quoting,
    pub chunk_size: usize,
    pub malformed_lines: MalformedLinePolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountrySettings {
    pub column: String,
    pub allow: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValiditySettings {
    pub invalid_tokens: Vec<String>,
    pub grades: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Stages run by `run-all`, in order.
    pub stages: Vec<StageKind>,
}

/// Optional replacements for a stage's paths and column lists.
///
/// `columns` is the keep list for streamed stages, the drop list for
/// `drop-columns` and the required numeric columns for `require-scores`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageOverride {
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub columns: Option<Vec<String>>,
    pub score_column: Option<String>,
    pub grade_column: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            source: PathBuf::from(DEFAULT_SOURCE_FILE),
            stream: StreamSettings::default(),
            countries: CountrySettings::default(),
            validity: ValiditySettings::default(),
            pipeline: PipelineSettings::default(),
            stages: HashMap::new(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            quoting: Quoting::Disabled,
            chunk_size: DEFAULT_CHUNK_SIZE,
            malformed_lines: MalformedLinePolicy::Skip,
        }
    }
}

impl Default for CountrySettings {
    fn default() -> Self {
        Self {
            column: COUNTRIES_EN.to_string(),
            allow: to_owned_list(ENGLISH_SPEAKING_COUNTRIES),
        }
    }
}

impl Default for ValiditySettings {
    fn default() -> Self {
        Self {
            invalid_tokens: to_owned_list(INVALID_SCORE_TOKENS),
            grades: to_owned_list(VALID_GRADES),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stages: vec![
                StageKind::Countries,
                StageKind::EnvValidity,
                StageKind::NutriValidity,
                StageKind::RequireScores,
                StageKind::DropColumns,
            ],
        }
    }
}

impl StreamSettings {
    /// The delimiter as a single byte.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if !self.delimiter.is_ascii() {
            return Err(EtlError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        Ok(self.delimiter as u8)
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path (argument or `OFF_EXTRACT_CONFIG`) must exist. Without
    /// one, `off_extract.toml` in the working directory is used if present and
    /// defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let named = explicit.map(Path::to_path_buf).or(from_env);

        let config = match named {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.delimiter_byte()?;
        if self.stream.chunk_size == 0 {
            return Err(EtlError::Config("stream.chunk_size must be at least 1".to_string()));
        }
        if self.countries.allow.is_empty() {
            return Err(EtlError::Config(
                "countries.allow must list at least one country".to_string(),
            ));
        }
        for name in self.stages.keys() {
            name.parse::<StageKind>()?;
        }
        if self.pipeline.stages.is_empty() {
            return Err(EtlError::Config(
                "pipeline.stages must list at least one stage".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve `path` against `data_dir`, expanding a leading `~/`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let path = expand_home(path);
        if path.is_absolute() {
            path
        } else {
            expand_home(&self.data_dir).join(path)
        }
    }

    pub fn stage_override(&self, kind: StageKind) -> Option<&StageOverride> {
        self.stages.get(kind.name())
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.stream.delimiter_byte().unwrap(), b'\t');
        assert_eq!(config.stream.chunk_size, 200_000);
        assert_eq!(config.stream.quoting, Quoting::Disabled);
        assert_eq!(config.countries.allow.len(), 9);
        assert_eq!(config.pipeline.stages.first(), Some(&StageKind::Countries));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            data_dir = "/srv/off"

            [stream]
            chunk_size = 5000
            malformed_lines = "fail"

            [stages.env-validity]
            destination = "env.csv"

            [stages.drop-columns]
            columns = ["completeness"]
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.chunk_size, 5000);
        assert_eq!(config.stream.malformed_lines, MalformedLinePolicy::Fail);
        assert_eq!(config.stream.delimiter, '\t');
        let env = config.stage_override(StageKind::EnvValidity).unwrap();
        assert_eq!(env.destination.as_deref(), Some(Path::new("env.csv")));
        assert_eq!(
            config.resolve(Path::new("env.csv")),
            PathBuf::from("/srv/off/env.csv")
        );
        assert_eq!(
            config.resolve(Path::new("/tmp/x.csv")),
            PathBuf::from("/tmp/x.csv")
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            AppConfig::from_toml("chunksize = 3"),
            Err(EtlError::Toml(_))
        ));
    }

    #[test]
    fn test_unknown_stage_override_is_rejected() {
        let config = AppConfig::from_toml("[stages.nutrition]\ndestination = \"x.csv\"").unwrap();
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = AppConfig::default();
        config.stream.chunk_size = 0;
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let mut config = AppConfig::default();
        config.stream.delimiter = '¦';
        assert!(config.validate().is_err());
    }
}
