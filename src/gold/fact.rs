use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, Int64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::dimension::CountryDimension;
use crate::error::ConfigError;
use crate::table::{utf8_column, CONTINENT, COUNTRY, COUNTRY_ID, COUNTRY_SK, ISO_CODE, YEAR};

/// Descriptive columns that live in the dimension, not the fact table.
const DESCRIPTIVE_COLUMNS: [&str; 2] = [COUNTRY, CONTINENT];
/// Natural key spellings dropped once the surrogate key is attached.
const NATURAL_KEY_COLUMNS: [&str; 2] = [ISO_CODE, COUNTRY_ID];

/// Build `fact_emissions`: `country_sk, year, <measures...>`.
///
/// The join is a left join. A row whose natural key has no dimension entry
/// keeps a null `country_sk`; rows are never dropped or duplicated.
#[instrument(level = "info", skip_all, fields(rows = silver.num_rows(), countries = dimension.len()))]
pub fn build_fact(silver: &RecordBatch, dimension: &CountryDimension) -> Result<RecordBatch> {
    let natural_key = NATURAL_KEY_COLUMNS
        .iter()
        .find(|c| silver.column_by_name(c).is_some())
        .copied()
        .ok_or_else(|| ConfigError::MissingColumn {
            column: ISO_CODE.to_string(),
            table: "silver".to_string(),
        })?;
    let year_idx = silver
        .schema()
        .index_of(YEAR)
        .map_err(|_| ConfigError::MissingColumn {
            column: YEAR.to_string(),
            table: "silver".to_string(),
        })?;

    let ids = utf8_column(silver, natural_key)?
        .with_context(|| format!("reading natural key '{}'", natural_key))?;
    let keys = dimension.surrogate_keys();
    let country_sk: Int64Array = ids
        .iter()
        .map(|opt| opt.and_then(|id| keys.get(id).copied()))
        .collect();

    let unmatched = country_sk.null_count();
    if unmatched > 0 {
        warn!(unmatched, "fact rows without a matching country");
    }

    let schema = silver.schema();
    let mut fields = vec![
        Field::new(COUNTRY_SK, DataType::Int64, true),
        schema.field(year_idx).clone(),
    ];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(country_sk), silver.column(year_idx).clone()];

    for (i, fld) in schema.fields().iter().enumerate() {
        let name = fld.name().as_str();
        if i == year_idx
            || DESCRIPTIVE_COLUMNS.contains(&name)
            || NATURAL_KEY_COLUMNS.contains(&name)
        {
            continue;
        }
        fields.push(Field::clone(fld));
        columns.push(silver.column(i).clone());
    }

    let fact = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building fact_emissions batch")?;
    info!(rows = fact.num_rows(), unmatched, "built fact_emissions");
    Ok(fact)
}
