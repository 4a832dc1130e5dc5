//! Descriptive summaries of the cleaned table's numeric columns, including
//! the 1.5×IQR outlier count per column. Diagnostic output only; nothing here
//! feeds back into the pipeline.

use arrow::array::Float64Array;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub iqr_outliers: usize,
}

/// Quantile by linear interpolation over a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

fn summarize_column(name: &str, values: &Float64Array) -> Option<NumericSummary> {
    let mut present: Vec<f64> = values.iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = present.len();
    let mean = present.iter().sum::<f64>() / n as f64;
    let q1 = quantile(&present, 0.25);
    let q3 = quantile(&present, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;
    let iqr_outliers = present.iter().filter(|v| **v < lower || **v > upper).count();

    Some(NumericSummary {
        column: name.to_string(),
        count: n,
        mean,
        median: quantile(&present, 0.5),
        min: present[0],
        max: present[n - 1],
        iqr_outliers,
    })
}

/// Summaries for every `Float64` column, in schema order. Entirely-null
/// columns are skipped.
pub fn summarize_numeric(batch: &RecordBatch) -> Vec<NumericSummary> {
    let mut summaries = Vec::new();
    for (i, field) in batch.schema().fields().iter().enumerate() {
        if field.data_type() != &DataType::Float64 {
            continue;
        }
        let farr = batch
            .column(i)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float64 column");
        if let Some(summary) = summarize_column(field.name(), farr) {
            summaries.push(summary);
        }
    }
    summaries
}
