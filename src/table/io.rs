// src/table/io.rs
use anyhow::{Context, Result};
use arrow::{
    compute::concat_batches,
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use bytes::Bytes;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{io::Cursor, sync::Arc};
use tracing::debug;

const BATCH_ROWS: usize = 8192;

/// Decode a delimited text payload into a single batch, every column Utf8.
///
/// Header names are kept exactly as the file spells them; empty fields decode
/// as null.
pub fn read_csv(data: &[u8]) -> Result<RecordBatch> {
    let (header, _) = Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(data), Some(0))
        .context("reading CSV header")?;

    let fields: Vec<Field> = header
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(BATCH_ROWS)
        .build(Cursor::new(data))
        .context("creating CSV reader")?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context("reading CSV batch")?;
    let table = concat_batches(&schema, &batches).context("concatenating CSV batches")?;

    debug!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        "decoded CSV"
    );
    Ok(table)
}

/// Encode `batch` as an in-memory Parquet file with the Arrow schema embedded.
pub fn write_parquet(batch: &RecordBatch) -> Result<Bytes> {
    let mut buffer = Vec::new();

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    Ok(Bytes::from(buffer))
}

/// Decode an in-memory Parquet file into a single batch.
pub fn read_parquet(data: Bytes) -> Result<RecordBatch> {
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(data).context("opening parquet payload")?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(BATCH_ROWS)
        .build()
        .context("building parquet reader")?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context("reading parquet batch")?;
    concat_batches(&schema, &batches).context("concatenating parquet batches")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};

    #[test]
    fn read_csv_keeps_raw_headers_and_nulls_empty_fields() -> Result<()> {
        let csv = " Country ,Year,iso_code,co2\nFrance,2020,FRA,300.5\n,2021,,\n";
        let table = read_csv(csv.as_bytes())?;

        let names: Vec<String> = table
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec![" Country ", "Year", "iso_code", "co2"]);
        assert_eq!(table.num_rows(), 2);
        assert!(table
            .schema()
            .fields()
            .iter()
            .all(|f| f.data_type() == &DataType::Utf8));

        let country = table
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8 column");
        assert_eq!(country.value(0), "France");
        assert!(country.is_null(1));
        Ok(())
    }

    #[test]
    fn parquet_round_trip_preserves_types_and_values() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("country_sk", DataType::Int64, true),
            Field::new("year", DataType::Int64, false),
            Field::new("co2", DataType::Float64, true),
            Field::new("note", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])) as ArrayRef,
                Arc::new(Int64Array::from(vec![1990, 1991, 1992])),
                Arc::new(Float64Array::from(vec![Some(0.1), Some(2.25), None])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])),
            ],
        )?;

        let back = read_parquet(write_parquet(&batch)?)?;

        assert_eq!(back.schema().fields(), batch.schema().fields());
        assert_eq!(back.columns(), batch.columns());
        Ok(())
    }
}
