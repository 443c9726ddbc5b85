// src/silver/mod.rs
//
// Bronze → Silver: normalize first so the gate sees canonical names and a
// coerced `year`.

pub mod normalize;
pub mod quality;

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use tracing::error;

pub use normalize::{normalize, normalize_column_name};
pub use quality::QualityGate;

/// Normalize `raw` and run it through `gate`. Nothing is returned unless the
/// whole table passes.
pub fn transform(raw: &RecordBatch, gate: &QualityGate) -> Result<RecordBatch> {
    let silver = normalize(raw)?;
    if let Err(e) = gate.validate(&silver) {
        error!(error = %e, "silver table rejected");
        return Err(e.into());
    }
    Ok(silver)
}
