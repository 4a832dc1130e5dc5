//! The cleaning pipeline: six ordered, idempotent rules over the session
//! table. Row-level problems are recovered locally (drop or impute) and
//! tallied in [`CleanReport`]; only structural problems abort a run.

pub mod coerce;
pub mod dates;
pub mod dedup;
pub mod derive;
pub mod missing;
pub mod text;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use arrow::array::{Array, BooleanArray, StringArray};
use arrow::compute::filter_record_batch;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::load::{raw_to_batch, RawTable};
use crate::schema::{self, CleanPolicies, ColumnKind};

/// Row-level accounting for one cleaning run. Every dropped row lands in
/// exactly one counter, so `rows_in = rows_out + drops` always balances.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_missing_required: usize,
    pub dropped_bad_timestamp: usize,
    pub dropped_inverted_duration: usize,
    pub dropped_duplicate: usize,
    /// Cells filled with the column median, per column.
    pub imputed: BTreeMap<String, usize>,
    /// Values that failed numeric coercion and became null, per column.
    pub coercion_failures: BTreeMap<String, usize>,
}

impl CleanReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_missing_required
            + self.dropped_bad_timestamp
            + self.dropped_inverted_duration
            + self.dropped_duplicate
    }

    /// Exact accounting invariant: no untracked row loss.
    pub fn accounted(&self) -> bool {
        self.rows_in == self.rows_out + self.rows_dropped()
    }
}

/// Clean a freshly loaded raw table.
pub fn clean(raw: &RawTable, policies: &CleanPolicies) -> Result<(RecordBatch, CleanReport)> {
    let batch = raw_to_batch(raw)?;
    clean_batch(batch, policies)
}

/// Run the six rules in order. Accepts an already-clean table too, in which
/// case every rule is a no-op and the report shows zero drops.
#[instrument(level = "info", skip_all, fields(rows_in = batch.num_rows()))]
pub fn clean_batch(
    batch: RecordBatch,
    policies: &CleanPolicies,
) -> Result<(RecordBatch, CleanReport)> {
    let mut report = CleanReport {
        rows_in: batch.num_rows(),
        ..Default::default()
    };

    // 1) string normalization
    let batch = text::normalize_strings(&batch).context("string normalization")?;

    // 2) missing values, drop-row half; imputation follows coercion below
    let (batch, dropped_missing) =
        missing::drop_missing_required(&batch, policies).context("missing-value handling")?;
    report.dropped_missing_required = dropped_missing;

    // 3) datetime parsing
    let (batch, dropped_ts) = drop_bad_timestamps(&batch).context("datetime parsing")?;
    report.dropped_bad_timestamp = dropped_ts;

    // 4) type coercion
    let (batch, coercion_failures) = coerce::coerce_types(&batch).context("type coercion")?;
    report.coercion_failures = coercion_failures;

    // 2b) impute now that numeric nulls exist
    let (batch, imputed) =
        missing::impute_numeric_medians(&batch, policies).context("median imputation")?;
    report.imputed = imputed;

    // 5) derived columns
    let (batch, dropped_inverted) = derive::derive_columns(&batch).context("derived columns")?;
    report.dropped_inverted_duration = dropped_inverted;

    // 6) de-duplication
    let (batch, dropped_dup) = dedup::drop_duplicate_rows(&batch).context("de-duplication")?;
    report.dropped_duplicate = dropped_dup;

    report.rows_out = batch.num_rows();
    info!(
        rows_out = report.rows_out,
        dropped = report.rows_dropped(),
        "cleaning finished"
    );
    Ok((batch, report))
}

/// Rule 3: drop rows whose timestamp text does not parse. Typed timestamp
/// columns (from a previous run) are left alone.
fn drop_bad_timestamps(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let mut keep = vec![true; batch.num_rows()];

    for spec in schema::CATALOGUE.iter().filter(|c| c.kind == ColumnKind::Timestamp) {
        let Some(col) = batch.column_by_name(spec.name) else {
            continue;
        };
        if col.data_type() != &DataType::Utf8 {
            continue;
        }
        let sarr = col
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8 column");
        for (i, flag) in keep.iter_mut().enumerate() {
            if !sarr.is_null(i) && dates::parse_timestamp_millis(sarr.value(i)).is_none() {
                *flag = false;
            }
        }
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        debug!(dropped, "rows dropped for unparsable timestamps");
    }
    let filtered = filter_record_batch(batch, &BooleanArray::from(keep))
        .context("filtering rows with unparsable timestamps")?;
    Ok((filtered, dropped))
}
