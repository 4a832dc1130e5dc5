//! Post-clean invariant checks.
//!
//! A failed check never aborts anything by itself; it lands in the
//! [`ValidationReport`] so the caller can tell a pipeline regression from a
//! clean run. Checks skip columns that are absent, so partial tables (as in
//! unit tests) validate what they carry.

use std::collections::HashMap;

use arrow::array::{Array, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use tracing::{debug, warn};

use crate::clean::dates::millis_to_datetime;
use crate::clean::derive::{day_of_week, duration_hours, time_of_day};
use crate::clean::text::canonical_label;
use crate::clean::CleanReport;
use crate::schema::{
    self, ColumnKind, CHARGE_DIFFERENCE_PCT, CHARGING_DURATION_HOURS, CHARGING_DURATION_MINUTES,
    CHARGING_END_TIME, CHARGING_RATE_KW, CHARGING_START_TIME, DAY_OF_WEEK, ENERGY_CONSUMED_KWH,
    STATE_OF_CHARGE_END_PCT, STATE_OF_CHARGE_START_PCT, TIME_OF_DAY,
};
use crate::schema::CHARGING_COST_USD;

const FLOAT_TOLERANCE: f64 = 1e-9;

/// Columns that must never go negative after cleaning.
const NON_NEGATIVE: &[&str] = &[
    CHARGING_DURATION_HOURS,
    CHARGING_DURATION_MINUTES,
    ENERGY_CONSUMED_KWH,
    CHARGING_COST_USD,
    CHARGING_RATE_KW,
];

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub invariant: String,
    pub count: usize,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub rows: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

fn floats<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
}

fn timestamps<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a TimestampMillisecondArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
}

/// Check every post-clean invariant and fold the results into a report.
pub fn validate(batch: &RecordBatch, clean_report: &CleanReport) -> ValidationReport {
    let mut violations = Vec::new();

    check_required_non_null(batch, &mut violations);
    check_categorical_canonical(batch, &mut violations);
    check_interval_order(batch, &mut violations);
    check_non_negative(batch, &mut violations);
    check_derived_consistency(batch, &mut violations);
    check_accounting(clean_report, &mut violations);

    if violations.is_empty() {
        debug!(rows = batch.num_rows(), "validation passed");
    } else {
        warn!(
            rows = batch.num_rows(),
            violations = violations.len(),
            "validation failed"
        );
    }
    ValidationReport {
        rows: batch.num_rows(),
        violations,
    }
}

fn check_required_non_null(batch: &RecordBatch, out: &mut Vec<Violation>) {
    for name in schema::required_columns() {
        if let Some(col) = batch.column_by_name(name) {
            if col.null_count() > 0 {
                out.push(Violation {
                    invariant: "required-non-null".into(),
                    count: col.null_count(),
                    detail: format!("{name} still contains nulls"),
                });
            }
        }
    }
}

fn check_categorical_canonical(batch: &RecordBatch, out: &mut Vec<Violation>) {
    for spec in schema::CATALOGUE.iter().filter(|c| c.kind == ColumnKind::Categorical) {
        let Some(sarr) = strings(batch, spec.name) else {
            continue;
        };

        // distinct surviving values, grouped by their normalized form
        let mut groups: HashMap<String, Vec<&str>> = HashMap::new();
        let mut non_canonical = 0usize;
        for value in sarr.iter().flatten() {
            if canonical_label(spec.name, value).as_deref() != Some(value) {
                non_canonical += 1;
            }
            if let Some(norm) = crate::clean::text::normalize_label(value) {
                let variants = groups.entry(norm).or_default();
                if !variants.contains(&value) {
                    variants.push(value);
                }
            }
        }
        let colliding: usize = groups
            .values()
            .filter(|v| v.len() > 1)
            .map(|v| v.len() - 1)
            .sum();

        if non_canonical > 0 || colliding > 0 {
            out.push(Violation {
                invariant: "categorical-canonical".into(),
                count: non_canonical + colliding,
                detail: format!(
                    "{}: {} non-canonical value(s), {} case/whitespace collision(s)",
                    spec.name, non_canonical, colliding
                ),
            });
        }
    }
}

fn check_interval_order(batch: &RecordBatch, out: &mut Vec<Violation>) {
    let (Some(start), Some(end)) = (
        timestamps(batch, CHARGING_START_TIME),
        timestamps(batch, CHARGING_END_TIME),
    ) else {
        return;
    };
    let inverted = (0..batch.num_rows())
        .filter(|&i| !start.is_null(i) && !end.is_null(i) && end.value(i) < start.value(i))
        .count();
    if inverted > 0 {
        out.push(Violation {
            invariant: "interval-order".into(),
            count: inverted,
            detail: "charging end precedes start".into(),
        });
    }
}

fn check_non_negative(batch: &RecordBatch, out: &mut Vec<Violation>) {
    for name in NON_NEGATIVE {
        let Some(farr) = floats(batch, name) else {
            continue;
        };
        let negatives = farr.iter().flatten().filter(|v| *v < 0.0).count();
        if negatives > 0 {
            out.push(Violation {
                invariant: "non-negative".into(),
                count: negatives,
                detail: format!("{name} contains negative values"),
            });
        }
    }
}

fn check_derived_consistency(batch: &RecordBatch, out: &mut Vec<Violation>) {
    let (Some(start), Some(end)) = (
        timestamps(batch, CHARGING_START_TIME),
        timestamps(batch, CHARGING_END_TIME),
    ) else {
        return;
    };

    let mut mismatches = 0usize;
    for i in 0..batch.num_rows() {
        if start.is_null(i) || end.is_null(i) {
            continue;
        }
        let expected_hours = duration_hours(start.value(i), end.value(i));
        if let Some(hours) = floats(batch, CHARGING_DURATION_HOURS) {
            if hours.is_null(i) || (hours.value(i) - expected_hours).abs() > FLOAT_TOLERANCE {
                mismatches += 1;
                continue;
            }
        }
        if let Some(minutes) = floats(batch, CHARGING_DURATION_MINUTES) {
            if minutes.is_null(i)
                || (minutes.value(i) - expected_hours * 60.0).abs() > FLOAT_TOLERANCE
            {
                mismatches += 1;
                continue;
            }
        }
        let Some(start_dt) = millis_to_datetime(start.value(i)) else {
            mismatches += 1;
            continue;
        };
        if let Some(tod) = strings(batch, TIME_OF_DAY) {
            if tod.is_null(i) || tod.value(i) != time_of_day(&start_dt) {
                mismatches += 1;
                continue;
            }
        }
        if let Some(dow) = strings(batch, DAY_OF_WEEK) {
            if dow.is_null(i) || dow.value(i) != day_of_week(&start_dt) {
                mismatches += 1;
                continue;
            }
        }
        if let (Some(diff), Some(socs), Some(soce)) = (
            floats(batch, CHARGE_DIFFERENCE_PCT),
            floats(batch, STATE_OF_CHARGE_START_PCT),
            floats(batch, STATE_OF_CHARGE_END_PCT),
        ) {
            if !socs.is_null(i)
                && !soce.is_null(i)
                && (diff.is_null(i)
                    || (diff.value(i) - (soce.value(i) - socs.value(i))).abs() > FLOAT_TOLERANCE)
            {
                mismatches += 1;
            }
        }
    }
    if mismatches > 0 {
        out.push(Violation {
            invariant: "derived-consistency".into(),
            count: mismatches,
            detail: "derived columns disagree with their source timestamps".into(),
        });
    }
}

fn check_accounting(report: &CleanReport, out: &mut Vec<Violation>) {
    if !report.accounted() {
        out.push(Violation {
            invariant: "row-accounting".into(),
            count: 1,
            detail: format!(
                "rows_in {} != rows_out {} + dropped {}",
                report.rows_in,
                report.rows_out,
                report.rows_dropped()
            ),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::dates::parse_timestamp_millis;
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use std::sync::Arc;

    fn ts_field(name: &str) -> Field {
        Field::new(name, DataType::Timestamp(TimeUnit::Millisecond, None), true)
    }

    fn balanced_report(rows_in: usize, rows_out: usize) -> CleanReport {
        CleanReport {
            rows_in,
            rows_out,
            ..Default::default()
        }
    }

    #[test]
    fn clean_table_passes() {
        let schema = Schema::new(vec![
            Field::new(schema::VEHICLE_MODEL, DataType::Utf8, true),
            ts_field(CHARGING_START_TIME),
            ts_field(CHARGING_END_TIME),
            Field::new(CHARGING_DURATION_HOURS, DataType::Float64, true),
            Field::new(TIME_OF_DAY, DataType::Utf8, true),
        ]);
        let start = parse_timestamp_millis("2024-01-05 08:00").unwrap();
        let end = parse_timestamp_millis("2024-01-05 09:30").unwrap();
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec![Some("Tesla Model 3")])),
                Arc::new(TimestampMillisecondArray::from(vec![Some(start)])),
                Arc::new(TimestampMillisecondArray::from(vec![Some(end)])),
                Arc::new(Float64Array::from(vec![Some(1.5)])),
                Arc::new(StringArray::from(vec![Some("Morning")])),
            ],
        )
        .unwrap();

        let report = validate(&batch, &balanced_report(1, 1));
        assert!(report.passed(), "unexpected violations: {:?}", report.violations);
    }

    #[test]
    fn detects_case_collisions_and_non_canonical_labels() {
        let schema = Schema::new(vec![Field::new(schema::VEHICLE_MODEL, DataType::Utf8, true)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(vec![
                Some("tesla model 3"),
                Some("Tesla Model 3"),
            ]))],
        )
        .unwrap();

        let report = validate(&batch, &balanced_report(2, 2));
        assert!(!report.passed());
        assert!(report
            .violations
            .iter()
            .any(|v| v.invariant == "categorical-canonical"));
    }

    #[test]
    fn detects_inverted_intervals_and_stale_derivations() {
        let schema = Schema::new(vec![
            ts_field(CHARGING_START_TIME),
            ts_field(CHARGING_END_TIME),
            Field::new(CHARGING_DURATION_HOURS, DataType::Float64, true),
        ]);
        let start = parse_timestamp_millis("2024-01-05 08:00").unwrap();
        let end = parse_timestamp_millis("2024-01-05 07:30").unwrap();
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(TimestampMillisecondArray::from(vec![Some(start)])),
                Arc::new(TimestampMillisecondArray::from(vec![Some(end)])),
                // stale value from the raw export, not end - start
                Arc::new(Float64Array::from(vec![Some(1.5)])),
            ],
        )
        .unwrap();

        let report = validate(&batch, &balanced_report(1, 1));
        let invariants: Vec<&str> = report
            .violations
            .iter()
            .map(|v| v.invariant.as_str())
            .collect();
        assert!(invariants.contains(&"interval-order"));
        assert!(invariants.contains(&"derived-consistency"));
    }

    #[test]
    fn detects_untracked_row_loss() {
        let schema = Schema::new(vec![Field::new(schema::VEHICLE_MODEL, DataType::Utf8, true)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(vec![Some("Tesla Model 3")]))],
        )
        .unwrap();

        let unbalanced = CleanReport {
            rows_in: 5,
            rows_out: 1,
            dropped_duplicate: 1,
            ..Default::default()
        };
        let report = validate(&batch, &unbalanced);
        assert!(report
            .violations
            .iter()
            .any(|v| v.invariant == "row-accounting"));
    }
}
