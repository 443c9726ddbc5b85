use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{debug, instrument};

use crate::error::{ConfigError, QualityError};
use crate::table::{float_values, int_values, COUNTRY_SK, YEAR};

/// Decimal places of the yearly total in the published table.
pub const TOTAL_DECIMALS: i32 = 2;
/// Decimal places of the yearly mean in the published table.
pub const MEAN_DECIMALS: i32 = 4;

/// Unrounded yearly rollup of the primary measure.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalYearAggregate {
    pub year: i64,
    pub total: f64,
    /// `None` when every measure value in the year is null.
    pub mean: Option<f64>,
    /// Distinct non-null `country_sk` values seen in the year.
    pub country_count: i64,
}

/// One country's summed measure within a year, with its dense rank.
#[derive(Debug, Clone, PartialEq)]
pub struct TopEmitterRow {
    pub year: i64,
    pub country_sk: i64,
    pub total: f64,
    pub rank: i64,
}

/// Columns of the fact table the aggregator reads.
struct MeasureView {
    years: Vec<Option<i64>>,
    keys: Vec<Option<i64>>,
    values: Vec<Option<f64>>,
}

impl MeasureView {
    fn from_fact(fact: &RecordBatch, measure: &str) -> Result<Self> {
        let missing = |column: &str| ConfigError::MissingColumn {
            column: column.to_string(),
            table: "fact_emissions".to_string(),
        };
        let non_numeric = |column: &str| QualityError::NonNumericColumn {
            column: column.to_string(),
        };

        let measure_col = fact.column_by_name(measure).ok_or_else(|| missing(measure))?;
        let year_col = fact.column_by_name(YEAR).ok_or_else(|| missing(YEAR))?;
        let key_col = fact
            .column_by_name(COUNTRY_SK)
            .ok_or_else(|| missing(COUNTRY_SK))?;

        Ok(Self {
            years: int_values(year_col).ok_or_else(|| non_numeric(YEAR))?,
            keys: int_values(key_col).ok_or_else(|| non_numeric(COUNTRY_SK))?,
            values: float_values(measure_col).ok_or_else(|| non_numeric(measure))?,
        })
    }

    fn rows(&self) -> impl Iterator<Item = (i64, Option<i64>, Option<f64>)> + '_ {
        self.years
            .iter()
            .zip(&self.keys)
            .zip(&self.values)
            .filter_map(|((year, key), value)| year.map(|y| (y, *key, *value)))
    }
}

/// Fail unless `measure` is a column of `fact`.
pub fn require_measure(fact: &RecordBatch, measure: &str) -> Result<(), ConfigError> {
    if fact.column_by_name(measure).is_some() {
        Ok(())
    } else {
        Err(ConfigError::MissingColumn {
            column: measure.to_string(),
            table: "fact_emissions".to_string(),
        })
    }
}

/// Sum, mean and distinct country count of `measure` per year, ascending by
/// year. Null measure values are skipped; null surrogate keys do not count as
/// a country.
#[instrument(level = "info", skip(fact), fields(rows = fact.num_rows()))]
pub fn global_yearly(fact: &RecordBatch, measure: &str) -> Result<Vec<GlobalYearAggregate>> {
    #[derive(Default)]
    struct Acc {
        sum: f64,
        n: usize,
        countries: BTreeSet<i64>,
    }

    let view = MeasureView::from_fact(fact, measure)?;
    let mut by_year: BTreeMap<i64, Acc> = BTreeMap::new();
    for (year, key, value) in view.rows() {
        let acc = by_year.entry(year).or_default();
        if let Some(v) = value {
            acc.sum += v;
            acc.n += 1;
        }
        if let Some(k) = key {
            acc.countries.insert(k);
        }
    }

    let out: Vec<GlobalYearAggregate> = by_year
        .into_iter()
        .map(|(year, acc)| GlobalYearAggregate {
            year,
            total: acc.sum,
            mean: (acc.n > 0).then(|| acc.sum / acc.n as f64),
            country_count: acc.countries.len() as i64,
        })
        .collect();
    debug!(years = out.len(), "global yearly rollup");
    Ok(out)
}

/// Per year, countries ranked by summed `measure` (descending, dense rank),
/// keeping every row with rank ≤ `n`. Output is ordered by `(year, rank,
/// country_sk)`. Rows with a null surrogate key are left out.
#[instrument(level = "info", skip(fact), fields(rows = fact.num_rows()))]
pub fn top_emitters(fact: &RecordBatch, measure: &str, n: usize) -> Result<Vec<TopEmitterRow>> {
    let view = MeasureView::from_fact(fact, measure)?;
    let cutoff = i64::try_from(n).unwrap_or(i64::MAX);
    let mut sums: BTreeMap<i64, BTreeMap<i64, f64>> = BTreeMap::new();
    for (year, key, value) in view.rows() {
        let Some(key) = key else {
            continue;
        };
        *sums.entry(year).or_default().entry(key).or_insert(0.0) += value.unwrap_or(0.0);
    }

    let mut out = Vec::new();
    for (year, countries) in sums {
        let mut ranked: Vec<(i64, f64)> = countries.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut rank = 0i64;
        let mut prev: Option<f64> = None;
        for (country_sk, total) in ranked {
            if prev != Some(total) {
                rank += 1;
                prev = Some(total);
            }
            if rank > cutoff {
                break;
            }
            out.push(TopEmitterRow {
                year,
                country_sk,
                total,
                rank,
            });
        }
    }
    debug!(rows = out.len(), "top emitters");
    Ok(out)
}

/// Round half away from zero to `places` decimals. Presentation only.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// `year, total_<measure>, avg_<measure>, country_count`, rounded for
/// publication.
pub fn global_yearly_batch(rows: &[GlobalYearAggregate], measure: &str) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(YEAR, DataType::Int64, false),
        Field::new(format!("total_{}", measure), DataType::Float64, false),
        Field::new(format!("avg_{}", measure), DataType::Float64, true),
        Field::new("country_count", DataType::Int64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.year))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| round_to(r.total, TOTAL_DECIMALS)),
        )),
        Arc::new(
            rows.iter()
                .map(|r| r.mean.map(|m| round_to(m, MEAN_DECIMALS)))
                .collect::<Float64Array>(),
        ),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.country_count),
        )),
    ];
    RecordBatch::try_new(schema, columns).context("building agg_global_yearly batch")
}

/// `year, country_sk, total_<measure>, rank`, rounded for publication.
pub fn top_emitters_batch(rows: &[TopEmitterRow], measure: &str) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(YEAR, DataType::Int64, false),
        Field::new(COUNTRY_SK, DataType::Int64, false),
        Field::new(format!("total_{}", measure), DataType::Float64, false),
        Field::new("rank", DataType::Int64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.year))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.country_sk))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| round_to(r.total, TOTAL_DECIMALS)),
        )),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.rank))),
    ];
    RecordBatch::try_new(schema, columns).context("building agg_top_emitters batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn fact(rows: &[(Option<i64>, i64, Option<f64>)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("country_sk", DataType::Int64, true),
            Field::new("year", DataType::Int64, true),
            Field::new("co2", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(rows.iter().map(|r| r.0).collect::<Int64Array>()) as ArrayRef,
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
                Arc::new(rows.iter().map(|r| r.2).collect::<Float64Array>()),
            ],
        )
        .expect("valid test batch")
    }

    #[test]
    fn yearly_rollup_sums_averages_and_counts() -> Result<()> {
        let t = fact(&[
            (Some(1), 2000, Some(10.0)),
            (Some(2), 2000, Some(20.0)),
            (Some(3), 2000, Some(30.0)),
        ]);
        let rows = global_yearly(&t, "co2")?;
        assert_eq!(
            rows,
            vec![GlobalYearAggregate {
                year: 2000,
                total: 60.0,
                mean: Some(20.0),
                country_count: 3
            }]
        );
        Ok(())
    }

    #[test]
    fn yearly_rollup_excludes_nulls_from_counts() -> Result<()> {
        let t = fact(&[
            (Some(1), 2001, Some(1.0)),
            (None, 2001, Some(3.0)),
            (Some(1), 2001, None),
            (Some(2), 1999, None),
        ]);
        let rows = global_yearly(&t, "co2")?;

        assert_eq!(rows[0].year, 1999);
        assert_eq!(rows[0].total, 0.0);
        assert_eq!(rows[0].mean, None);
        assert_eq!(rows[0].country_count, 1);

        assert_eq!(rows[1].total, 4.0);
        assert_eq!(rows[1].mean, Some(2.0));
        assert_eq!(rows[1].country_count, 1);
        Ok(())
    }

    #[test]
    fn dense_rank_shares_ties_without_gaps() -> Result<()> {
        let t = fact(&[
            (Some(4), 2010, Some(100.0)),
            (Some(2), 2010, Some(100.0)),
            (Some(7), 2010, Some(90.0)),
            (Some(9), 2010, Some(80.0)),
            (None, 2010, Some(500.0)),
        ]);
        let rows = top_emitters(&t, "co2", 10)?;
        let ranks: Vec<(i64, i64)> = rows.iter().map(|r| (r.country_sk, r.rank)).collect();
        assert_eq!(ranks, vec![(2, 1), (4, 1), (7, 2), (9, 3)]);
        Ok(())
    }

    #[test]
    fn top_n_sums_per_country_and_cuts_per_year() -> Result<()> {
        let mut input = Vec::new();
        for sk in 1..=12 {
            input.push((Some(sk), 2020, Some(sk as f64)));
        }
        input.push((Some(1), 2020, Some(100.0)));
        input.push((Some(5), 2019, Some(1.0)));
        let rows = top_emitters(&fact(&input), "co2", 10)?;

        let y2019: Vec<&TopEmitterRow> = rows.iter().filter(|r| r.year == 2019).collect();
        let y2020: Vec<&TopEmitterRow> = rows.iter().filter(|r| r.year == 2020).collect();
        assert_eq!(y2019.len(), 1);
        assert_eq!(y2020.len(), 10);
        assert_eq!(y2020[0].country_sk, 1);
        assert_eq!(y2020[0].total, 101.0);
        assert_eq!(y2020[9].rank, 10);
        assert_eq!(rows[0].year, 2019);
        Ok(())
    }

    #[test]
    fn ties_on_the_cut_rank_are_all_kept() -> Result<()> {
        let t = fact(&[
            (Some(1), 2000, Some(5.0)),
            (Some(2), 2000, Some(3.0)),
            (Some(3), 2000, Some(3.0)),
            (Some(4), 2000, Some(1.0)),
        ]);
        let rows = top_emitters(&t, "co2", 2)?;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.rank <= 2));
        Ok(())
    }

    #[test]
    fn huge_cutoff_keeps_every_ranked_row() -> Result<()> {
        let t = fact(&[
            (Some(1), 2000, Some(5.0)),
            (Some(2), 2000, Some(3.0)),
            (None, 2000, Some(9.0)),
        ]);
        let rows = top_emitters(&t, "co2", usize::MAX)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].rank, 2);
        Ok(())
    }

    #[test]
    fn missing_measure_is_a_configuration_error() {
        let t = fact(&[(Some(1), 2000, Some(1.0))]);
        assert!(require_measure(&t, "co2").is_ok());
        assert_eq!(
            require_measure(&t, "methane"),
            Err(ConfigError::MissingColumn {
                column: "methane".into(),
                table: "fact_emissions".into()
            })
        );
        let err = global_yearly(&t, "methane").unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn rounding_happens_only_in_presentation() -> Result<()> {
        let t = fact(&[
            (Some(1), 2000, Some(1.0 / 3.0)),
            (Some(2), 2000, Some(2.0 / 3.0)),
            (Some(3), 2000, Some(0.123456)),
        ]);
        let rows = global_yearly(&t, "co2")?;
        let exact_mean = (1.0 / 3.0 + 2.0 / 3.0 + 0.123456) / 3.0;
        assert_eq!(rows[0].mean, Some(exact_mean));

        let batch = global_yearly_batch(&rows, "co2")?;
        let names: Vec<&str> = batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["year", "total_co2", "avg_co2", "country_count"]);

        let total = batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float total");
        let mean = batch
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float mean");
        assert_eq!(total.value(0), 1.12);
        assert_eq!(mean.value(0), 0.3745);
        assert!(!mean.is_null(0));
        Ok(())
    }

    #[test]
    fn rollup_example_presents_expected_values() -> Result<()> {
        let t = fact(&[
            (Some(1), 2000, Some(10.0)),
            (Some(2), 2000, Some(20.0)),
            (Some(3), 2000, Some(30.0)),
        ]);
        let batch = global_yearly_batch(&global_yearly(&t, "co2")?, "co2")?;
        let total = batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float total");
        let mean = batch
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float mean");
        let count = batch
            .column(3)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int count");
        assert_eq!(total.value(0), 60.00);
        assert_eq!(mean.value(0), 20.0000);
        assert_eq!(count.value(0), 3);
        Ok(())
    }

    #[test]
    fn round_to_handles_places() {
        assert_eq!(round_to(2.345678, 4), 2.3457);
        assert_eq!(round_to(59.999, 2), 60.0);
        assert_eq!(round_to(-1.005, 0), -1.0);
    }
}
