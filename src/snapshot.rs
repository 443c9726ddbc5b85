// src/snapshot.rs
//
// Every object lives under `<entity>/snapshot_date=<YYYY-MM-DD>/<file>` inside
// its layer's container.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::{collections::BTreeSet, fmt, str::FromStr};
use tracing::warn;

use crate::error::ConfigError;

pub const PARTITION_KEY: &str = "snapshot_date";

/// Date a snapshot partition is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SnapshotDate(NaiveDate);

impl SnapshotDate {
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }
}

impl FromStr for SnapshotDate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| ConfigError::InvalidValue {
                key: PARTITION_KEY,
                value: s.to_string(),
            })
    }
}

impl fmt::Display for SnapshotDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Storage layer; each maps to one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub fn container(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

/// A snapshot-partitioned dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dataset {
    pub layer: Layer,
    pub entity: &'static str,
    pub file_name: &'static str,
}

impl Dataset {
    pub const BRONZE_OWID: Dataset = Dataset {
        layer: Layer::Bronze,
        entity: "owid",
        file_name: "owid-co2-data.csv",
    };
    pub const SILVER_OWID: Dataset = Dataset {
        layer: Layer::Silver,
        entity: "owid",
        file_name: "owid-co2-data.parquet",
    };
    pub const DIM_COUNTRY: Dataset = Dataset {
        layer: Layer::Gold,
        entity: "dim_country",
        file_name: "dim_country.parquet",
    };
    pub const FACT_EMISSIONS: Dataset = Dataset {
        layer: Layer::Gold,
        entity: "fact_emissions",
        file_name: "fact_emissions.parquet",
    };
    pub const AGG_GLOBAL_YEARLY: Dataset = Dataset {
        layer: Layer::Gold,
        entity: "agg_global_yearly",
        file_name: "agg_global_yearly.parquet",
    };
    pub const AGG_TOP_EMITTERS: Dataset = Dataset {
        layer: Layer::Gold,
        entity: "agg_top_emitters",
        file_name: "agg_top_emitters.parquet",
    };

    pub fn container(&self) -> &'static str {
        self.layer.container()
    }

    /// Prefix shared by every partition of this dataset.
    pub fn prefix(&self) -> String {
        format!("{}/", self.entity)
    }

    /// Object path of this dataset in `snapshot`.
    pub fn path(&self, snapshot: SnapshotDate) -> String {
        format!(
            "{}/{}={}/{}",
            self.entity, PARTITION_KEY, snapshot, self.file_name
        )
    }
}

/// Collect the distinct `snapshot_date=` values found in `paths`, ordered by
/// date. Segments that are not valid dates are skipped.
pub fn partitions<'a, I>(paths: I) -> BTreeSet<SnapshotDate>
where
    I: IntoIterator<Item = &'a str>,
{
    let marker = format!("{}=", PARTITION_KEY);
    let mut out = BTreeSet::new();
    for path in paths {
        for segment in path.split('/') {
            if let Some(value) = segment.strip_prefix(&marker) {
                match value.parse::<SnapshotDate>() {
                    Ok(date) => {
                        out.insert(date);
                    }
                    Err(_) => warn!(path, "ignoring malformed snapshot partition"),
                }
            }
        }
    }
    out
}

/// Most recent partition.
pub fn latest(partitions: &BTreeSet<SnapshotDate>) -> Option<SnapshotDate> {
    partitions.iter().next_back().copied()
}
