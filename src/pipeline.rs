// src/pipeline.rs
//
// Sequences the stages for one snapshot. Each stage reads its input from the
// blob store, fully materializes its output, and writes it back before the
// next stage starts.

use anyhow::{anyhow, Context, Result};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use tracing::{error, info, instrument};

use crate::config::PipelineConfig;
use crate::fetch::SourceFeed;
use crate::gold;
use crate::silver::{self, QualityGate};
use crate::snapshot::{self, Dataset, SnapshotDate};
use crate::store::BlobStore;
use crate::table::{read_csv, read_parquet, write_parquet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Silver,
    Gold,
    Aggregate,
}

/// What one stage wrote.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub snapshot_date: SnapshotDate,
    /// Rows in the primary output table (0 for Bronze, which is stored raw).
    pub rows: usize,
    pub bytes: usize,
    /// `<container>/<path>` of every object written.
    pub objects: Vec<String>,
}

/// Outcome of a full Bronze → Gold run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub snapshot_date: SnapshotDate,
    pub stages: Vec<StageReport>,
    pub elapsed_seconds: f64,
}

pub struct Pipeline {
    store: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(store: Arc<dyn BlobStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// `requested` if given, else the newest partition of `dataset`.
    pub async fn resolve_snapshot(
        &self,
        dataset: Dataset,
        requested: Option<SnapshotDate>,
    ) -> Result<SnapshotDate> {
        if let Some(date) = requested {
            return Ok(date);
        }
        let listed = self
            .store
            .list(dataset.container(), &dataset.prefix())
            .await
            .with_context(|| format!("listing {}/{}", dataset.container(), dataset.prefix()))?;
        let found = snapshot::partitions(listed.iter().map(String::as_str));
        let date = snapshot::latest(&found)
            .ok_or_else(|| anyhow!("no {} snapshots found", dataset.container()))?;
        info!(snapshot = %date, partitions = found.len(), "resolved latest snapshot");
        Ok(date)
    }

    /// Source Feed → Bronze, bytes untouched.
    #[instrument(level = "info", skip_all, fields(snapshot = %snapshot))]
    pub async fn ingest(&self, feed: &dyn SourceFeed, snapshot: SnapshotDate) -> Result<StageReport> {
        let data = feed.fetch(&self.config.source_url).await?;
        let bytes = data.len();
        let object = self.put(Dataset::BRONZE_OWID, snapshot, data).await?;
        info!(bytes, object = %object, "bronze snapshot stored");
        Ok(StageReport {
            stage: Stage::Ingest,
            snapshot_date: snapshot,
            rows: 0,
            bytes,
            objects: vec![object],
        })
    }

    /// Bronze → Silver. Nothing is written if the quality gate rejects the table.
    #[instrument(level = "info", skip_all, fields(snapshot = %snapshot))]
    pub async fn build_silver(&self, snapshot: SnapshotDate) -> Result<StageReport> {
        let raw_bytes = self.get(Dataset::BRONZE_OWID, snapshot).await?;
        let raw = read_csv(&raw_bytes).context("decoding bronze CSV")?;
        info!(rows = raw.num_rows(), columns = raw.num_columns(), "loaded bronze");

        let gate = QualityGate::for_current_year(self.config.primary_measure.as_str());
        let silver = silver::transform(&raw, &gate)?;

        let (object, bytes) = self.put_table(Dataset::SILVER_OWID, snapshot, &silver).await?;
        info!(rows = silver.num_rows(), columns = silver.num_columns(), "silver written");
        Ok(StageReport {
            stage: Stage::Silver,
            snapshot_date: snapshot,
            rows: silver.num_rows(),
            bytes,
            objects: vec![object],
        })
    }

    /// Silver → dim_country + fact_emissions.
    #[instrument(level = "info", skip_all, fields(snapshot = %snapshot))]
    pub async fn build_gold(&self, snapshot: SnapshotDate) -> Result<StageReport> {
        let silver = self.get_table(Dataset::SILVER_OWID, snapshot).await?;
        let base = gold::build_base_tables(&silver)?;
        let dim = base.dimension.to_record_batch()?;

        let (dim_object, dim_bytes) = self.put_table(Dataset::DIM_COUNTRY, snapshot, &dim).await?;
        let (fact_object, fact_bytes) = self
            .put_table(Dataset::FACT_EMISSIONS, snapshot, &base.fact)
            .await?;

        info!(
            countries = dim.num_rows(),
            facts = base.fact.num_rows(),
            "gold base tables written"
        );
        Ok(StageReport {
            stage: Stage::Gold,
            snapshot_date: snapshot,
            rows: base.fact.num_rows(),
            bytes: dim_bytes + fact_bytes,
            objects: vec![dim_object, fact_object],
        })
    }

    /// fact_emissions → yearly rollup + top emitters.
    #[instrument(level = "info", skip_all, fields(snapshot = %snapshot))]
    pub async fn build_aggregates(&self, snapshot: SnapshotDate) -> Result<StageReport> {
        let fact = self.get_table(Dataset::FACT_EMISSIONS, snapshot).await?;
        let tables = gold::build_aggregate_tables(
            &fact,
            &self.config.primary_measure,
            self.config.top_n,
        )?;

        let (yearly_object, yearly_bytes) = self
            .put_table(Dataset::AGG_GLOBAL_YEARLY, snapshot, &tables.global_yearly)
            .await?;
        let (top_object, top_bytes) = self
            .put_table(Dataset::AGG_TOP_EMITTERS, snapshot, &tables.top_emitters)
            .await?;

        info!(
            years = tables.global_yearly.num_rows(),
            top_rows = tables.top_emitters.num_rows(),
            "gold aggregates written"
        );
        Ok(StageReport {
            stage: Stage::Aggregate,
            snapshot_date: snapshot,
            rows: tables.global_yearly.num_rows(),
            bytes: yearly_bytes + top_bytes,
            objects: vec![yearly_object, top_object],
        })
    }

    /// Every stage in order for `snapshot`; the first failure ends the run.
    pub async fn run(&self, feed: &dyn SourceFeed, snapshot: SnapshotDate) -> Result<RunSummary> {
        let start = Instant::now();
        info!(snapshot = %snapshot, "pipeline run starting");

        let mut stages = Vec::with_capacity(4);
        stages.push(log_failure(Stage::Ingest, self.ingest(feed, snapshot).await)?);
        stages.push(log_failure(Stage::Silver, self.build_silver(snapshot).await)?);
        stages.push(log_failure(Stage::Gold, self.build_gold(snapshot).await)?);
        stages.push(log_failure(Stage::Aggregate, self.build_aggregates(snapshot).await)?);

        let elapsed = start.elapsed().as_secs_f64();
        info!(snapshot = %snapshot, elapsed, "pipeline run complete");
        Ok(RunSummary {
            snapshot_date: snapshot,
            stages,
            elapsed_seconds: elapsed,
        })
    }

    async fn get(&self, dataset: Dataset, snapshot: SnapshotDate) -> Result<Bytes> {
        let path = dataset.path(snapshot);
        self.store
            .get(dataset.container(), &path)
            .await
            .with_context(|| format!("downloading {}/{}", dataset.container(), path))
    }

    async fn put(&self, dataset: Dataset, snapshot: SnapshotDate, data: Bytes) -> Result<String> {
        let path = dataset.path(snapshot);
        self.store
            .put(dataset.container(), &path, data)
            .await
            .with_context(|| format!("uploading {}/{}", dataset.container(), path))?;
        Ok(format!("{}/{}", dataset.container(), path))
    }

    async fn get_table(&self, dataset: Dataset, snapshot: SnapshotDate) -> Result<RecordBatch> {
        let data = self.get(dataset, snapshot).await?;
        read_parquet(data).with_context(|| format!("decoding {}", dataset.file_name))
    }

    async fn put_table(
        &self,
        dataset: Dataset,
        snapshot: SnapshotDate,
        table: &RecordBatch,
    ) -> Result<(String, usize)> {
        let data = write_parquet(table).with_context(|| format!("encoding {}", dataset.file_name))?;
        let bytes = data.len();
        let object = self.put(dataset, snapshot, data).await?;
        Ok((object, bytes))
    }
}

fn log_failure<T>(stage: Stage, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!(?stage, error = %format!("{:#}", e), "stage failed");
    }
    result
}
