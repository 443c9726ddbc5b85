use thiserror::Error;

/// A Silver table failed one of the Quality Gate checks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityError {
    #[error("data quality check failed: table is empty")]
    Empty,

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("{count} null values found in '{column}' column")]
    NullValues { column: String, count: usize },

    #[error("{count} invalid years detected outside {min}-{max}")]
    YearOutOfRange { min: i64, max: i64, count: usize },

    #[error("{count} negative values detected in '{column}'")]
    NegativeMeasure { column: String, count: usize },

    #[error("column '{column}' is not numeric")]
    NonNumericColumn { column: String },
}

/// Settings or schema expectations that make a stage impossible to run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingSetting(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("expected column '{column}' missing from {table}")]
    MissingColumn { column: String, table: String },
}
