//! Rule 5: derived columns.
//!
//! Rows whose timestamps invert (end before start) are dropped first; the
//! survivors get their duration, time-of-day bucket, day-of-week and
//! state-of-charge difference recomputed from the cleaned source columns. The
//! raw export carries its own (dirty) versions of several of these, which are
//! overwritten rather than trusted.
//!
//! Bucket boundaries: Morning 05:00-11:59, Afternoon 12:00-16:59,
//! Evening 17:00-21:59, Night 22:00-04:59.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMillisecondArray,
};
use arrow::compute::filter_record_batch;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use tracing::debug;

use crate::clean::dates::millis_to_datetime;
use crate::schema::{
    CHARGE_DIFFERENCE_PCT, CHARGING_DURATION_HOURS, CHARGING_DURATION_MINUTES, CHARGING_END_TIME,
    CHARGING_START_TIME, DAY_OF_WEEK, STATE_OF_CHARGE_END_PCT, STATE_OF_CHARGE_START_PCT,
    TIME_OF_DAY,
};

pub fn duration_hours(start_ms: i64, end_ms: i64) -> f64 {
    (end_ms - start_ms) as f64 / 3_600_000.0
}

pub fn time_of_day(dt: &NaiveDateTime) -> &'static str {
    match dt.hour() {
        5..=11 => "Morning",
        12..=16 => "Afternoon",
        17..=21 => "Evening",
        _ => "Night",
    }
}

pub fn day_of_week(dt: &NaiveDateTime) -> &'static str {
    match dt.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn timestamps<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a TimestampMillisecondArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
        .ok_or_else(|| anyhow!("column {name} is not a millisecond timestamp"))
}

fn floats<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
}

/// Replace `name` in place if present, append it otherwise.
fn set_column(
    fields: &mut Vec<Field>,
    columns: &mut Vec<ArrayRef>,
    name: &str,
    data_type: DataType,
    array: ArrayRef,
) {
    match fields.iter().position(|f| f.name() == name) {
        Some(i) => {
            fields[i] = Field::new(name, data_type, true);
            columns[i] = array;
        }
        None => {
            fields.push(Field::new(name, data_type, true));
            columns.push(array);
        }
    }
}

/// Apply rule 5. Returns the derived batch and the number of rows dropped for
/// inverted timestamps.
pub fn derive_columns(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    // 1) drop inversions: end strictly before start, both present
    let start = timestamps(batch, CHARGING_START_TIME)?;
    let end = timestamps(batch, CHARGING_END_TIME)?;
    let keep: Vec<bool> = (0..batch.num_rows())
        .map(|i| {
            if start.is_null(i) || end.is_null(i) {
                true
            } else {
                end.value(i) >= start.value(i)
            }
        })
        .collect();
    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        debug!(dropped, "rows dropped for inverted charging interval");
    }
    let batch = filter_record_batch(batch, &BooleanArray::from(keep))
        .context("filtering inverted-interval rows")?;

    // 2) recompute everything downstream of the timestamps
    let start = timestamps(&batch, CHARGING_START_TIME)?;
    let end = timestamps(&batch, CHARGING_END_TIME)?;
    let n = batch.num_rows();

    let mut hours = Vec::with_capacity(n);
    let mut minutes = Vec::with_capacity(n);
    let mut buckets: Vec<Option<&'static str>> = Vec::with_capacity(n);
    let mut days: Vec<Option<&'static str>> = Vec::with_capacity(n);
    for i in 0..n {
        let s = (!start.is_null(i)).then(|| start.value(i));
        let e = (!end.is_null(i)).then(|| end.value(i));
        let h = match (s, e) {
            (Some(s), Some(e)) => Some(duration_hours(s, e)),
            _ => None,
        };
        hours.push(h);
        minutes.push(h.map(|h| h * 60.0));
        let start_dt = s.and_then(millis_to_datetime);
        buckets.push(start_dt.as_ref().map(time_of_day));
        days.push(start_dt.as_ref().map(day_of_week));
    }

    let soc_diff: Vec<Option<f64>> = match (
        floats(&batch, STATE_OF_CHARGE_START_PCT),
        floats(&batch, STATE_OF_CHARGE_END_PCT),
    ) {
        (Some(socs), Some(soce)) => (0..n)
            .map(|i| match (socs.is_null(i), soce.is_null(i)) {
                (false, false) => Some(soce.value(i) - socs.value(i)),
                _ => None,
            })
            .collect(),
        _ => vec![None; n],
    };

    let mut fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    set_column(
        &mut fields,
        &mut columns,
        CHARGING_DURATION_HOURS,
        DataType::Float64,
        Arc::new(Float64Array::from(hours)) as ArrayRef,
    );
    set_column(
        &mut fields,
        &mut columns,
        TIME_OF_DAY,
        DataType::Utf8,
        Arc::new(buckets.into_iter().collect::<StringArray>()) as ArrayRef,
    );
    set_column(
        &mut fields,
        &mut columns,
        DAY_OF_WEEK,
        DataType::Utf8,
        Arc::new(days.into_iter().collect::<StringArray>()) as ArrayRef,
    );
    set_column(
        &mut fields,
        &mut columns,
        CHARGE_DIFFERENCE_PCT,
        DataType::Float64,
        Arc::new(Float64Array::from(soc_diff)) as ArrayRef,
    );
    set_column(
        &mut fields,
        &mut columns,
        CHARGING_DURATION_MINUTES,
        DataType::Float64,
        Arc::new(Float64Array::from(minutes)) as ArrayRef,
    );

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("rebuilding batch with derived columns")?;
    Ok((batch, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::dates::parse_timestamp_millis;

    fn dt(s: &str) -> NaiveDateTime {
        millis_to_datetime(parse_timestamp_millis(s).unwrap()).unwrap()
    }

    #[test]
    fn duration_is_end_minus_start_in_hours() {
        let start = parse_timestamp_millis("2024-01-05 08:00").unwrap();
        let end = parse_timestamp_millis("2024-01-05 09:30").unwrap();
        assert_eq!(duration_hours(start, end), 1.5);
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(time_of_day(&dt("2024-01-05 05:00")), "Morning");
        assert_eq!(time_of_day(&dt("2024-01-05 11:59")), "Morning");
        assert_eq!(time_of_day(&dt("2024-01-05 12:00")), "Afternoon");
        assert_eq!(time_of_day(&dt("2024-01-05 16:59")), "Afternoon");
        assert_eq!(time_of_day(&dt("2024-01-05 17:00")), "Evening");
        assert_eq!(time_of_day(&dt("2024-01-05 21:59")), "Evening");
        assert_eq!(time_of_day(&dt("2024-01-05 22:00")), "Night");
        assert_eq!(time_of_day(&dt("2024-01-05 04:59")), "Night");
    }

    #[test]
    fn weekday_labels() {
        // 2024-01-05 is a Friday
        assert_eq!(day_of_week(&dt("2024-01-05 08:00")), "Friday");
        assert_eq!(day_of_week(&dt("2024-01-07 08:00")), "Sunday");
    }

    #[test]
    fn inverted_rows_are_dropped_and_counted() {
        let schema = Schema::new(vec![
            Field::new(
                CHARGING_START_TIME,
                DataType::Timestamp(arrow::datatypes::TimeUnit::Millisecond, None),
                true,
            ),
            Field::new(
                CHARGING_END_TIME,
                DataType::Timestamp(arrow::datatypes::TimeUnit::Millisecond, None),
                true,
            ),
        ]);
        let start = TimestampMillisecondArray::from(vec![
            parse_timestamp_millis("2024-01-05 08:00"),
            parse_timestamp_millis("2024-01-05 08:00"),
        ]);
        // second row ends before it starts
        let end = TimestampMillisecondArray::from(vec![
            parse_timestamp_millis("2024-01-05 09:30"),
            parse_timestamp_millis("2024-01-05 07:30"),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(start) as ArrayRef, Arc::new(end) as ArrayRef],
        )
        .unwrap();

        let (out, dropped) = derive_columns(&batch).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(out.num_rows(), 1);

        let hours = out
            .column_by_name(CHARGING_DURATION_HOURS)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(hours.value(0), 1.5);
        let minutes = out
            .column_by_name(CHARGING_DURATION_MINUTES)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(minutes.value(0), 90.0);
    }
}
