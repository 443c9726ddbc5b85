// src/fetch.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Upstream CSV published by Our World in Data.
pub const OWID_CO2_URL: &str = "https://raw.githubusercontent.com/owid/co2-data/master/owid-co2-data.csv";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Where Bronze bytes come from.
#[async_trait]
pub trait SourceFeed: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Plain HTTP GET; no retries.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: Client,
}

impl HttpFeed {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFeed for HttpFeed {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let url = Url::parse(url).with_context(|| format!("parsing source URL {}", url))?;
        let bytes = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?
            .bytes()
            .await
            .with_context(|| format!("reading body from {}", url))?;
        info!(url = %url, bytes = bytes.len(), "downloaded source");
        Ok(bytes)
    }
}
