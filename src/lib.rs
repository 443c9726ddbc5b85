//! Bronze/Silver/Gold batch pipeline for the OWID CO2 dataset.
//!
//! Bronze keeps the upstream CSV bytes, Silver holds a normalized and
//! quality-checked parquet table, and Gold holds a country star schema with
//! two aggregate reports. Every object is partitioned by `snapshot_date`.

pub mod config;
pub mod error;
pub mod fetch;
pub mod gold;
pub mod pipeline;
pub mod silver;
pub mod snapshot;
pub mod store;
pub mod table;
