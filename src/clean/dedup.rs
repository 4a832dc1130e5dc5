//! Rule 6: exact-duplicate removal across the full schema, keeping the first
//! occurrence.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, BooleanArray, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use tracing::debug;

const NULL_TOKEN: &str = "\u{0}";
const SEP: char = '\u{1}';

fn cell_token(batch: &RecordBatch, col: usize, row: usize) -> Result<String> {
    let arr = batch.column(col);
    if arr.is_null(row) {
        return Ok(NULL_TOKEN.to_string());
    }
    let any = arr.as_any();
    if let Some(a) = any.downcast_ref::<StringArray>() {
        return Ok(a.value(row).to_string());
    }
    if let Some(a) = any.downcast_ref::<Float64Array>() {
        // compare by bit pattern so identical cells match even for NaN
        return Ok(a.value(row).to_bits().to_string());
    }
    if let Some(a) = any.downcast_ref::<TimestampMillisecondArray>() {
        return Ok(a.value(row).to_string());
    }
    Err(anyhow!(
        "unsupported column type {:?} in duplicate check",
        batch.schema().field(col).data_type()
    ))
}

/// Drop rows identical to an earlier row in every column. Returns the pruned
/// batch and the number of rows removed.
pub fn drop_duplicate_rows(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let mut seen: HashSet<String> = HashSet::with_capacity(batch.num_rows());
    let mut keep = Vec::with_capacity(batch.num_rows());

    for row in 0..batch.num_rows() {
        let mut key = String::new();
        for col in 0..batch.num_columns() {
            key.push_str(&cell_token(batch, col, row)?);
            key.push(SEP);
        }
        keep.push(seen.insert(key));
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        debug!(dropped, "exact duplicate rows removed");
    }
    let filtered = filter_record_batch(batch, &BooleanArray::from(keep))
        .context("filtering duplicate rows")?;
    Ok((filtered, dropped))
}
