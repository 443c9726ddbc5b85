// src/gold/mod.rs
//
// Silver → Gold: star schema (dim_country + fact_emissions) and the
// aggregate reports built on top of the fact table.

pub mod aggregate;
pub mod dimension;
pub mod fact;

use anyhow::Result;
use arrow::record_batch::RecordBatch;

pub use aggregate::{
    global_yearly, global_yearly_batch, require_measure, top_emitters, top_emitters_batch,
    GlobalYearAggregate, TopEmitterRow,
};
pub use dimension::{build_dimension, CountryDimension, CountryRow};
pub use fact::build_fact;

/// The base Gold tables of one snapshot.
#[derive(Debug, Clone)]
pub struct BaseTables {
    pub dimension: CountryDimension,
    pub fact: RecordBatch,
}

/// The published aggregate tables of one snapshot.
#[derive(Debug, Clone)]
pub struct AggregateTables {
    pub global_yearly: RecordBatch,
    pub top_emitters: RecordBatch,
}

/// Dimension first, then the fact table joined against it.
pub fn build_base_tables(silver: &RecordBatch) -> Result<BaseTables> {
    let dimension = build_dimension(silver)?;
    let fact = build_fact(silver, &dimension)?;
    Ok(BaseTables { dimension, fact })
}

/// Both aggregate reports over `fact`. Fails before computing anything when
/// `measure` is not a column of the fact table.
pub fn build_aggregate_tables(
    fact: &RecordBatch,
    measure: &str,
    top_n: usize,
) -> Result<AggregateTables> {
    require_measure(fact, measure)?;
    let yearly = global_yearly(fact, measure)?;
    let top = top_emitters(fact, measure, top_n)?;
    Ok(AggregateTables {
        global_yearly: global_yearly_batch(&yearly, measure)?,
        top_emitters: top_emitters_batch(&top, measure)?,
    })
}
