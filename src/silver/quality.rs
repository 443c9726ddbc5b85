use arrow::{array::Array, record_batch::RecordBatch};
use chrono::{Datelike, Utc};
use tracing::{info, instrument};

use crate::error::QualityError;
use crate::table::{float_values, int_values, COUNTRY, YEAR};

/// Earliest year the emissions record can plausibly cover.
pub const MIN_YEAR: i64 = 1750;

/// Columns every Silver table must carry.
pub const REQUIRED_COLUMNS: [&str; 2] = [COUNTRY, YEAR];

/// Checks a normalized table before it may be promoted to Silver storage.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityGate {
    pub min_year: i64,
    pub max_year: i64,
    /// Column that must not hold negative values, when present.
    pub primary_measure: String,
}

impl QualityGate {
    /// Year bounds `[1750, current UTC year]`.
    pub fn for_current_year(primary_measure: impl Into<String>) -> Self {
        Self {
            min_year: MIN_YEAR,
            max_year: i64::from(Utc::now().year()),
            primary_measure: primary_measure.into(),
        }
    }

    /// Run every check in order and fail on the first violated one.
    #[instrument(level = "info", skip_all, fields(rows = table.num_rows()))]
    pub fn validate(&self, table: &RecordBatch) -> Result<(), QualityError> {
        // A. not empty
        if table.num_rows() == 0 {
            return Err(QualityError::Empty);
        }

        // B. required columns
        let mut missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| table.column_by_name(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(QualityError::MissingColumns(missing));
        }

        // C. nulls in key columns
        for column in REQUIRED_COLUMNS {
            let nulls = table
                .column_by_name(column)
                .map(|c| c.null_count())
                .unwrap_or_default();
            if nulls > 0 {
                return Err(QualityError::NullValues {
                    column: column.to_string(),
                    count: nulls,
                });
            }
        }

        // D. year range
        let years = table
            .column_by_name(YEAR)
            .and_then(int_values)
            .ok_or_else(|| QualityError::NonNumericColumn {
                column: YEAR.to_string(),
            })?;
        let out_of_range = years
            .iter()
            .flatten()
            .filter(|y| **y < self.min_year || **y > self.max_year)
            .count();
        if out_of_range > 0 {
            return Err(QualityError::YearOutOfRange {
                min: self.min_year,
                max: self.max_year,
                count: out_of_range,
            });
        }

        // E. primary measure non-negative
        if let Some(measure) = table.column_by_name(&self.primary_measure) {
            let values = float_values(measure).ok_or_else(|| QualityError::NonNumericColumn {
                column: self.primary_measure.clone(),
            })?;
            let negatives = values.iter().flatten().filter(|v| **v < 0.0).count();
            if negatives > 0 {
                return Err(QualityError::NegativeMeasure {
                    column: self.primary_measure.clone(),
                    count: negatives,
                });
            }
        }

        info!(rows = table.num_rows(), "data quality checks passed");
        Ok(())
    }
}
