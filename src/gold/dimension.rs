use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{info, instrument, warn};

use crate::error::ConfigError;
use crate::table::{utf8_column, CONTINENT, COUNTRY, COUNTRY_ID, COUNTRY_SK, ISO_CODE};

/// One row of `dim_country`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRow {
    pub country_id: String,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub country_sk: i64,
}

/// The country dimension. `country_sk` runs `1..=rows.len()` in ascending
/// `country_id` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryDimension {
    pub rows: Vec<CountryRow>,
    /// Whether the source carried a `continent` column.
    pub has_continent: bool,
}

impl CountryDimension {
    /// Natural key → surrogate key.
    pub fn surrogate_keys(&self) -> HashMap<&str, i64> {
        self.rows
            .iter()
            .map(|r| (r.country_id.as_str(), r.country_sk))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `country_id, country[, continent], country_sk`
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = vec![
            Field::new(COUNTRY_ID, DataType::Utf8, false),
            Field::new(COUNTRY, DataType::Utf8, true),
        ];
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                self.rows.iter().map(|r| r.country_id.as_str()),
            )),
            Arc::new(
                self.rows
                    .iter()
                    .map(|r| r.country.as_deref())
                    .collect::<StringArray>(),
            ),
        ];
        if self.has_continent {
            fields.push(Field::new(CONTINENT, DataType::Utf8, true));
            columns.push(Arc::new(
                self.rows
                    .iter()
                    .map(|r| r.continent.as_deref())
                    .collect::<StringArray>(),
            ));
        }
        fields.push(Field::new(COUNTRY_SK, DataType::Int64, false));
        columns.push(Arc::new(Int64Array::from_iter_values(
            self.rows.iter().map(|r| r.country_sk),
        )));

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .context("building dim_country batch")
    }
}

/// Derive the country dimension from a Silver table.
///
/// Rows without a natural key are skipped and exact duplicate tuples collapse.
/// Tuples are sorted by `(country_id, country, continent)` before keys are
/// handed out, so identical input always yields identical surrogate keys. If a
/// natural key still carries several attribute tuples, the first one in that
/// order wins.
#[instrument(level = "info", skip_all, fields(rows = silver.num_rows()))]
pub fn build_dimension(silver: &RecordBatch) -> Result<CountryDimension> {
    let iso = utf8_column(silver, ISO_CODE)?.ok_or_else(|| ConfigError::MissingColumn {
        column: ISO_CODE.to_string(),
        table: "silver".to_string(),
    })?;
    let country = utf8_column(silver, COUNTRY)?.ok_or_else(|| ConfigError::MissingColumn {
        column: COUNTRY.to_string(),
        table: "silver".to_string(),
    })?;
    let continent_col = utf8_column(silver, CONTINENT)?;

    let mut tuples: BTreeSet<(String, Option<String>, Option<String>)> = BTreeSet::new();
    for i in 0..silver.num_rows() {
        let Some(id) = value_at(&iso, i) else {
            continue;
        };
        tuples.insert((
            id.to_string(),
            value_at(&country, i).map(str::to_string),
            continent_col
                .as_ref()
                .and_then(|c| value_at(c, i))
                .map(str::to_string),
        ));
    }

    let mut rows: Vec<CountryRow> = Vec::with_capacity(tuples.len());
    for (country_id, country, continent) in tuples {
        if let Some(prev) = rows.last() {
            if prev.country_id == country_id {
                warn!(
                    country_id = %country_id,
                    kept = ?prev.country,
                    dropped = ?country,
                    "conflicting attributes for natural key"
                );
                continue;
            }
        }
        let country_sk = rows.len() as i64 + 1;
        rows.push(CountryRow {
            country_id,
            country,
            continent,
            country_sk,
        });
    }

    info!(countries = rows.len(), "built dim_country");
    Ok(CountryDimension {
        rows,
        has_continent: continent_col.is_some(),
    })
}

fn value_at(arr: &StringArray, i: usize) -> Option<&str> {
    if arr.is_null(i) {
        None
    } else {
        Some(arr.value(i))
    }
}
