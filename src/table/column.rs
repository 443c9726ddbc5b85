use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array, Int64Array, StringArray},
    compute::cast,
    datatypes::DataType,
    record_batch::RecordBatch,
};

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fetch `name` from `batch` as a Utf8 array, casting non-string columns.
/// Returns `Ok(None)` when the column is absent.
pub fn utf8_column(batch: &RecordBatch, name: &str) -> Result<Option<StringArray>> {
    let Some(arr) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let arr = if arr.data_type() == &DataType::Utf8 {
        arr.clone()
    } else {
        cast(arr, &DataType::Utf8).with_context(|| format!("casting '{}' to Utf8", name))?
    };
    let strings = arr
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("column '{}' is not Utf8 after cast", name))?
        .clone();
    Ok(Some(strings))
}

/// Integer view of an Int64/Int32 column; `None` for any other type.
pub fn int_values(arr: &ArrayRef) -> Option<Vec<Option<i64>>> {
    match arr.data_type() {
        DataType::Int64 => {
            let ints = arr.as_any().downcast_ref::<Int64Array>()?;
            Some(ints.iter().collect())
        }
        DataType::Int32 | DataType::Int16 | DataType::Int8 => {
            let widened = cast(arr, &DataType::Int64).ok()?;
            let ints = widened.as_any().downcast_ref::<Int64Array>()?;
            Some(ints.iter().collect())
        }
        _ => None,
    }
}

/// Floating point view of any numeric column; `None` for non-numeric types.
pub fn float_values(arr: &ArrayRef) -> Option<Vec<Option<f64>>> {
    if !arr.data_type().is_numeric() {
        return None;
    }
    let floats = if arr.data_type() == &DataType::Float64 {
        arr.clone()
    } else {
        cast(arr, &DataType::Float64).ok()?
    };
    let floats = floats.as_any().downcast_ref::<Float64Array>()?;
    Some(floats.iter().collect())
}
