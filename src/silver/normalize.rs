use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, Float64Array, Float64Builder, Int64Array, StringArray},
    compute::{cast, filter_record_batch},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::table::{clean_str, CONTINENT, COUNTRY, ISO_CODE, YEAR};

/// Columns that keep their text type even when every value looks numeric.
const TEXT_COLUMNS: [&str; 3] = [COUNTRY, ISO_CODE, CONTINENT];

/// trim → lowercase → spaces to underscores. Applying it twice is a no-op.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Parse a raw year cell. Integral float literals ("1990.0") are accepted;
/// anything else maps to `None`.
pub fn parse_year(raw: &str) -> Option<i64> {
    let cleaned = clean_str(raw);
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().and_then(integral))
}

fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Bronze → Silver: canonical column names, `year` coerced to Int64, numeric
/// text columns promoted to Float64, rows without `country` or `year` dropped.
#[instrument(level = "info", skip(raw), fields(rows = raw.num_rows(), columns = raw.num_columns()))]
pub fn normalize(raw: &RecordBatch) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(raw.num_columns());
    let mut columns = Vec::with_capacity(raw.num_columns());

    for (fld, arr) in raw.schema().fields().iter().zip(raw.columns()) {
        let name = normalize_column_name(fld.name());

        if name == YEAR {
            let years = coerce_year(arr)?;
            debug!(nulls = years.null_count(), "coerced year to Int64");
            fields.push(Field::new(&name, DataType::Int64, true));
            columns.push(years);
            continue;
        }

        if !TEXT_COLUMNS.contains(&name.as_str()) {
            if let Some(measure) = arr
                .as_any()
                .downcast_ref::<StringArray>()
                .and_then(infer_measure)
            {
                fields.push(Field::new(&name, DataType::Float64, true));
                columns.push(Arc::new(measure) as ArrayRef);
                continue;
            }
        }

        fields.push(Field::clone(fld).with_name(name));
        columns.push(arr.clone());
    }

    let renamed = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building normalized batch")?;

    let mut keep = vec![true; renamed.num_rows()];
    for key in [COUNTRY, YEAR] {
        if let Some(col) = renamed.column_by_name(key) {
            for (i, k) in keep.iter_mut().enumerate() {
                if col.is_null(i) {
                    *k = false;
                }
            }
        }
    }
    let silver = filter_record_batch(&renamed, &BooleanArray::from(keep))
        .context("dropping rows without country or year")?;

    info!(
        dropped = raw.num_rows() - silver.num_rows(),
        rows = silver.num_rows(),
        "normalized table"
    );
    Ok(silver)
}

fn coerce_year(arr: &ArrayRef) -> Result<ArrayRef> {
    if let Some(sarr) = arr.as_any().downcast_ref::<StringArray>() {
        let years: Int64Array = sarr.iter().map(|opt| opt.and_then(parse_year)).collect();
        return Ok(Arc::new(years));
    }
    if let Some(farr) = arr.as_any().downcast_ref::<Float64Array>() {
        let years: Int64Array = farr.iter().map(|opt| opt.and_then(integral)).collect();
        return Ok(Arc::new(years));
    }
    cast(arr, &DataType::Int64).context("coercing year to Int64")
}

/// Float64 version of `arr` when every non-null cell parses as a number
/// (an all-null column counts as numeric). NaN literals become null.
fn infer_measure(arr: &StringArray) -> Option<Float64Array> {
    let mut b = Float64Builder::with_capacity(arr.len());
    for opt in arr.iter() {
        match opt {
            None => b.append_null(),
            Some(s) => {
                let v: f64 = clean_str(s).parse().ok()?;
                if v.is_nan() {
                    b.append_null();
                } else {
                    b.append_value(v);
                }
            }
        }
    }
    Some(b.finish())
}
