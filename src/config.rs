use std::{env, path::PathBuf};

use crate::error::ConfigError;
use crate::fetch::OWID_CO2_URL;

pub const ENV_STORE_ROOT: &str = "LAKE_STORE_ROOT";
pub const ENV_SOURCE_URL: &str = "LAKE_SOURCE_URL";
pub const ENV_PRIMARY_MEASURE: &str = "LAKE_PRIMARY_MEASURE";
pub const ENV_TOP_N: &str = "LAKE_TOP_N";

pub const DEFAULT_PRIMARY_MEASURE: &str = "co2";
pub const DEFAULT_TOP_N: usize = 10;

/// Settings for one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Root directory of the local blob store.
    pub store_root: PathBuf,
    pub source_url: String,
    /// Measure checked by the gate and rolled up by the aggregator.
    pub primary_measure: String,
    pub top_n: usize,
}

/// Values given on the command line; they win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub store_root: Option<PathBuf>,
    pub source_url: Option<String>,
    pub primary_measure: Option<String>,
    pub top_n: Option<usize>,
}

impl PipelineConfig {
    /// Resolve settings from `overrides`, then the process environment, then
    /// defaults.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with an injectable lookup.
    pub fn resolve<F>(overrides: ConfigOverrides, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_root = overrides
            .store_root
            .or_else(|| lookup(ENV_STORE_ROOT).map(PathBuf::from))
            .ok_or(ConfigError::MissingSetting(ENV_STORE_ROOT))?;

        let source_url = overrides
            .source_url
            .or_else(|| lookup(ENV_SOURCE_URL))
            .unwrap_or_else(|| OWID_CO2_URL.to_string());

        let primary_measure = overrides
            .primary_measure
            .or_else(|| lookup(ENV_PRIMARY_MEASURE))
            .unwrap_or_else(|| DEFAULT_PRIMARY_MEASURE.to_string());

        let top_n = match overrides.top_n {
            Some(n) => n,
            None => match lookup(ENV_TOP_N) {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_TOP_N,
                    value: raw.clone(),
                })?,
                None => DEFAULT_TOP_N,
            },
        };
        if top_n == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_TOP_N,
                value: top_n.to_string(),
            });
        }

        Ok(Self {
            store_root,
            source_url,
            primary_measure,
            top_n,
        })
    }
}
