use anyhow::Result;
use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use owidlake::{
    config::PipelineConfig,
    fetch::SourceFeed,
    pipeline::{Pipeline, Stage},
    snapshot::{Dataset, SnapshotDate},
    store::{BlobStore, LocalBlobStore, MemoryBlobStore},
    table::read_parquet,
};
use std::{path::PathBuf, sync::Arc};
use tempfile::tempdir;

const OWID_SAMPLE: &str = "\
country,year,iso_code,continent,co2,population
France,2020,FRA,Europe,300,67
Germany,2020,DEU,Europe,700,83
World,2020,,,35000,7800
France,2021,FRA,Europe,310,67
Italy,2021,ITA,Europe,,59
,2021,XXX,Europe,5,1
";

struct StaticFeed;

#[async_trait]
impl SourceFeed for StaticFeed {
    async fn fetch(&self, _url: &str) -> Result<Bytes> {
        Ok(Bytes::from_static(OWID_SAMPLE.as_bytes()))
    }
}

fn config(root: PathBuf, top_n: usize) -> PipelineConfig {
    PipelineConfig {
        store_root: root,
        source_url: "https://example.invalid/owid-co2-data.csv".into(),
        primary_measure: "co2".into(),
        top_n,
    }
}

async fn load(store: &dyn BlobStore, dataset: Dataset, snap: SnapshotDate) -> Result<RecordBatch> {
    read_parquet(store.get(dataset.container(), &dataset.path(snap)).await?)
}

fn ints(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    let col = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .expect("int64 column");
    (0..col.len())
        .map(|i| (!col.is_null(i)).then(|| col.value(i)))
        .collect()
}

fn floats(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
    let col = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .expect("float64 column");
    (0..col.len())
        .map(|i| (!col.is_null(i)).then(|| col.value(i)))
        .collect()
}

#[tokio::test]
async fn bronze_to_gold_end_to_end() -> Result<()> {
    let store = Arc::new(MemoryBlobStore::new());
    let pipeline = Pipeline::new(store.clone(), config(PathBuf::from("unused"), 1));
    let snap: SnapshotDate = "2024-05-01".parse()?;

    let summary = pipeline.run(&StaticFeed, snap).await?;
    assert_eq!(summary.stages.len(), 4);
    assert_eq!(summary.stages[0].stage, Stage::Ingest);
    assert_eq!(summary.stages[0].bytes, OWID_SAMPLE.len());

    // Bronze is byte-identical to the feed.
    let bronze = store
        .get("bronze", "owid/snapshot_date=2024-05-01/owid-co2-data.csv")
        .await?;
    assert_eq!(bronze, Bytes::from_static(OWID_SAMPLE.as_bytes()));

    // The row with an empty country is dropped in Silver.
    let silver = load(store.as_ref(), Dataset::SILVER_OWID, snap).await?;
    assert_eq!(silver.num_rows(), 5);

    let dim = load(store.as_ref(), Dataset::DIM_COUNTRY, snap).await?;
    let ids = dim
        .column_by_name("country_id")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .expect("country_id column");
    let ids: Vec<&str> = (0..ids.len()).map(|i| ids.value(i)).collect();
    assert_eq!(ids, vec!["DEU", "FRA", "ITA"]);
    assert_eq!(ints(&dim, "country_sk"), vec![Some(1), Some(2), Some(3)]);

    let fact = load(store.as_ref(), Dataset::FACT_EMISSIONS, snap).await?;
    assert_eq!(fact.num_rows(), silver.num_rows());
    assert_eq!(fact.schema().field(0).name(), "country_sk");
    assert_eq!(fact.schema().field(1).name(), "year");
    assert_eq!(
        ints(&fact, "country_sk"),
        vec![Some(2), Some(1), None, Some(2), Some(3)]
    );

    let yearly = load(store.as_ref(), Dataset::AGG_GLOBAL_YEARLY, snap).await?;
    assert_eq!(ints(&yearly, "year"), vec![Some(2020), Some(2021)]);
    assert_eq!(floats(&yearly, "total_co2"), vec![Some(36000.0), Some(310.0)]);
    assert_eq!(floats(&yearly, "avg_co2"), vec![Some(12000.0), Some(310.0)]);
    assert_eq!(ints(&yearly, "country_count"), vec![Some(2), Some(2)]);

    let top = load(store.as_ref(), Dataset::AGG_TOP_EMITTERS, snap).await?;
    assert_eq!(ints(&top, "year"), vec![Some(2020), Some(2021)]);
    assert_eq!(ints(&top, "country_sk"), vec![Some(1), Some(2)]);
    assert_eq!(floats(&top, "total_co2"), vec![Some(700.0), Some(310.0)]);
    assert_eq!(ints(&top, "rank"), vec![Some(1), Some(1)]);
    Ok(())
}

#[tokio::test]
async fn stages_resume_from_latest_partition_on_disk() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(LocalBlobStore::new(dir.path()));
    let pipeline = Pipeline::new(store.clone(), config(dir.path().to_path_buf(), 10));

    let older: SnapshotDate = "2024-04-01".parse()?;
    let newer: SnapshotDate = "2024-05-01".parse()?;
    pipeline.ingest(&StaticFeed, older).await?;
    pipeline.ingest(&StaticFeed, newer).await?;

    let snap = pipeline.resolve_snapshot(Dataset::BRONZE_OWID, None).await?;
    assert_eq!(snap, newer);
    pipeline.build_silver(snap).await?;

    let snap = pipeline.resolve_snapshot(Dataset::SILVER_OWID, None).await?;
    assert_eq!(snap, newer);
    let report = pipeline.build_gold(snap).await?;
    assert_eq!(report.rows, 5);

    let snap = pipeline
        .resolve_snapshot(Dataset::FACT_EMISSIONS, None)
        .await?;
    let report = pipeline.build_aggregates(snap).await?;
    assert_eq!(report.rows, 2);

    assert!(dir
        .path()
        .join("gold/agg_top_emitters/snapshot_date=2024-05-01/agg_top_emitters.parquet")
        .is_file());
    assert!(!dir
        .path()
        .join("silver/owid/snapshot_date=2024-04-01")
        .exists());
    Ok(())
}

#[tokio::test]
async fn rerunning_a_snapshot_overwrites_identically() -> Result<()> {
    let store = Arc::new(MemoryBlobStore::new());
    let pipeline = Pipeline::new(store.clone(), config(PathBuf::from("unused"), 3));
    let snap: SnapshotDate = "2024-05-01".parse()?;

    pipeline.run(&StaticFeed, snap).await?;
    let first = load(store.as_ref(), Dataset::AGG_TOP_EMITTERS, snap).await?;
    pipeline.run(&StaticFeed, snap).await?;
    let second = load(store.as_ref(), Dataset::AGG_TOP_EMITTERS, snap).await?;

    assert_eq!(first, second);
    assert_eq!(store.len(), 6);
    Ok(())
}
