//! Rule 2: missing-value handling.
//!
//! Two passes share one policy map: rows null in any drop-row column go first
//! (before datetime parsing), and numeric imputation runs after coercion once
//! numeric nulls can exist at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::schema::{CleanPolicies, MissingPolicy};

/// Drop every row that is null in a drop-row column. Returns the surviving
/// batch and how many rows went.
pub fn drop_missing_required(
    batch: &RecordBatch,
    policies: &CleanPolicies,
) -> Result<(RecordBatch, usize)> {
    let required = policies.drop_row_columns();
    let mut keep = vec![true; batch.num_rows()];

    for name in &required {
        if let Some(col) = batch.column_by_name(name) {
            for (i, flag) in keep.iter_mut().enumerate() {
                if col.is_null(i) {
                    *flag = false;
                }
            }
        }
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        debug!(dropped, ?required, "rows dropped for missing required fields");
    }
    let filtered = filter_record_batch(batch, &BooleanArray::from(keep))
        .context("filtering rows with missing required fields")?;
    Ok((filtered, dropped))
}

/// Median of the non-null values, averaging the two middles for even counts.
/// `None` when the column is entirely null.
pub fn median(values: &Float64Array) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = present.len();
    Some(if n % 2 == 1 {
        present[n / 2]
    } else {
        (present[n / 2 - 1] + present[n / 2]) / 2.0
    })
}

/// Fill nulls in impute-median columns with the column median. Returns the
/// batch and the per-column count of filled cells. Entirely-null columns are
/// left alone (there is nothing to impute from).
pub fn impute_numeric_medians(
    batch: &RecordBatch,
    policies: &CleanPolicies,
) -> Result<(RecordBatch, BTreeMap<String, usize>)> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    let mut imputed: BTreeMap<String, usize> = BTreeMap::new();

    for (i, field) in batch.schema().fields().iter().enumerate() {
        let arr = batch.column(i);
        let eligible = policies.policy(field.name()) == MissingPolicy::ImputeMedian;
        let farr = arr.as_any().downcast_ref::<Float64Array>();

        match (eligible, farr) {
            (true, Some(farr)) if farr.null_count() > 0 => match median(farr) {
                Some(m) => {
                    let filled: Float64Array =
                        farr.iter().map(|opt| Some(opt.unwrap_or(m))).collect();
                    imputed.insert(field.name().clone(), farr.null_count());
                    debug!(
                        column = field.name().as_str(),
                        median = m,
                        filled = farr.null_count(),
                        "imputed nulls with column median"
                    );
                    columns.push(Arc::new(filled) as ArrayRef);
                }
                None => columns.push(arr.clone()),
            },
            _ => columns.push(arr.clone()),
        }
    }

    let batch = RecordBatch::try_new(batch.schema(), columns)
        .context("rebuilding batch after imputation")?;
    Ok((batch, imputed))
}
