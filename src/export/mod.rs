//! Optional persistence of the cleaned table. The in-memory batch is the
//! authoritative output; these writers exist for callers that want a file.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression};
use parquet::file::properties::WriterProperties;
use tracing::info;

/// Timestamp layout the CSV writer emits; the loader's parser accepts it, so
/// an exported table survives a reload-and-reclean round trip unchanged.
const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<u64> {
    let file = File::create(path)
        .with_context(|| format!("creating file {}", path.display()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    let metadata = std::fs::metadata(path).context("getting file metadata")?;
    info!(path = %path.display(), bytes = metadata.len(), "cleaned table written as parquet");
    Ok(metadata.len())
}

pub fn write_csv(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating file {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .with_header(true)
        .with_timestamp_format(CSV_TIMESTAMP_FORMAT.to_string())
        .build(file);
    writer.write(batch).context("writing batch to csv")?;
    info!(path = %path.display(), rows = batch.num_rows(), "cleaned table written as csv");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray, TimestampMillisecondArray};
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn sample_batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("model", DataType::Utf8, true),
            Field::new("cost", DataType::Float64, true),
            Field::new(
                "start",
                DataType::Timestamp(TimeUnit::Millisecond, None),
                true,
            ),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec![Some("Tesla Model 3")])),
                Arc::new(Float64Array::from(vec![Some(6.2)])),
                Arc::new(TimestampMillisecondArray::from(vec![Some(1_704_441_600_000)])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn parquet_round_trip_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.parquet");
        let batch = sample_batch();

        let bytes = write_parquet(&batch, &path).unwrap();
        assert!(bytes > 0);

        let file = File::open(&path).unwrap();
        let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let read = reader.next().unwrap().unwrap();
        assert_eq!(read.num_rows(), batch.num_rows());
        assert_eq!(read.schema().field(0).name(), "model");
    }

    #[test]
    fn csv_uses_loader_compatible_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.csv");
        write_csv(&sample_batch(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "model,cost,start");
        let row = lines.next().unwrap();
        assert!(row.contains("2024-01-05 08:00:00"), "row was: {row}");
    }
}
