// src/table/mod.rs
//
// Every layer of the lake holds one fully materialized `RecordBatch`.

pub mod column;
pub mod io;

pub use column::{clean_str, float_values, int_values, utf8_column};
pub use io::{read_csv, read_parquet, write_parquet};

/// Display name of the entity a row describes.
pub const COUNTRY: &str = "country";
/// Calendar year of the observation.
pub const YEAR: &str = "year";
/// Natural key as it appears in the source feed.
pub const ISO_CODE: &str = "iso_code";
/// Optional descriptive attribute carried into the country dimension.
pub const CONTINENT: &str = "continent";
/// Natural key as it appears in the country dimension.
pub const COUNTRY_ID: &str = "country_id";
/// Generated surrogate key.
pub const COUNTRY_SK: &str = "country_sk";
