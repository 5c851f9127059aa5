/// Default file names, column lists and token sets for the Open Food Facts extracts.
/// Every value here can be overridden from `off_extract.toml`.

// Stage names (used in CLI, config tables and reports)
pub const EXTRACT_STAGE: &str = "extract";
pub const COUNTRIES_STAGE: &str = "countries";
pub const ENV_VALIDITY_STAGE: &str = "env-validity";
pub const NUTRI_VALIDITY_STAGE: &str = "nutri-validity";
pub const REQUIRE_SCORES_STAGE: &str = "require-scores";
pub const DROP_COLUMNS_STAGE: &str = "drop-columns";

// File names, resolved against `data_dir`
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SOURCE_FILE: &str = "en.openfoodfacts.org.products.csv";
pub const EXTRACT_OUTPUT: &str = "filtered.csv";
pub const COUNTRIES_OUTPUT: &str = "filtered_en_countries.csv";
pub const ENV_VALIDITY_OUTPUT: &str = "filtered_env_real.csv";
pub const NUTRI_VALIDITY_OUTPUT: &str = "filtered_env_and_nutri_real.csv";
pub const REQUIRE_SCORES_OUTPUT: &str = "filtered_env_and_nutri_real_no_empty_scores.csv";
pub const DROP_COLUMNS_OUTPUT: &str = "filtered_env_and_nutri_real_cleaned.csv";

pub const DEFAULT_CONFIG_FILE: &str = "off_extract.toml";
pub const CONFIG_ENV_VAR: &str = "OFF_EXTRACT_CONFIG";

// Streaming defaults
pub const DEFAULT_CHUNK_SIZE: usize = 200_000;
pub const DEFAULT_DELIMITER: char = '\t';

// Column names
pub const ENV_SCORE: &str = "environmental_score_score";
pub const ENV_GRADE: &str = "environmental_score_grade";
pub const NUTRI_SCORE: &str = "nutriscore_score";
pub const NUTRI_GRADE: &str = "nutriscore_grade";
pub const COUNTRIES_EN: &str = "countries_en";

/// Wide projection: every label/allergen variant plus tag columns.
pub const EXTRACT_COLUMNS: &[&str] = &[
    "product_name",
    ENV_SCORE,
    ENV_GRADE,
    NUTRI_SCORE,
    NUTRI_GRADE,
    "labels",
    "labels_tags",
    "labels_en",
    "allergens",
    "allergens_en",
    "traces",
    "traces_en",
    "carbon-footprint_100g",
    "image_url",
    "image_small_url",
    "completeness",
    "countries_tags",
    COUNTRIES_EN,
];

/// Narrow projection: only the `_en` variants of localized fields.
pub const COUNTRIES_COLUMNS: &[&str] = &[
    "product_name",
    ENV_SCORE,
    ENV_GRADE,
    NUTRI_SCORE,
    NUTRI_GRADE,
    "labels_en",
    "allergens_en",
    "traces_en",
    "carbon-footprint_100g",
    "image_url",
    "image_small_url",
    "completeness",
    COUNTRIES_EN,
];

pub const ENGLISH_SPEAKING_COUNTRIES: &[&str] = &[
    "United States",
    "United Kingdom",
    "Canada",
    "Ireland",
    "Australia",
    "New Zealand",
    "South Africa",
    "Singapore",
    "India",
];

/// Score values that carry no information (compared trimmed and lowercased).
pub const INVALID_SCORE_TOKENS: &[&str] = &["", "nan", "none", "null", "unknown"];

/// Grades Open Food Facts assigns for both eco-score and nutri-score.
pub const VALID_GRADES: &[&str] = &["a", "b", "c", "d", "e"];

pub const REDUNDANT_COLUMNS: &[&str] = &[
    ENV_GRADE,
    NUTRI_GRADE,
    "carbon-footprint_100g",
    "completeness",
    COUNTRIES_EN,
];

pub const REQUIRED_NUMERIC_COLUMNS: &[&str] = &[ENV_SCORE, NUTRI_SCORE];

/// Owned copy of a constant column list.
pub fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
