//! Rule 4: type coercion, text columns to their final Arrow types.
//!
//! Numeric-kind columns become `Float64`, timestamp columns become
//! `Timestamp(ms)`; anything that fails to parse becomes null and is counted
//! so the imputation pass can deal with it. Columns that are already typed
//! pass straight through.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, Float64Builder, StringArray, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::clean::dates::parse_timestamp_millis;
use crate::schema::{self, ColumnKind, SymbolStrip};

/// Strip the junk the export wraps some values in, per the catalogue.
pub fn strip_symbols(value: &str, strip: Option<SymbolStrip>) -> String {
    let v = value.trim();
    match strip {
        Some(SymbolStrip::LeadingDollar) => v.trim_start_matches('$').trim().to_string(),
        Some(SymbolStrip::TrailingPercent) => v.trim_end_matches('%').trim().to_string(),
        Some(SymbolStrip::StationPrefix) => v.strip_prefix('S').unwrap_or(v).to_string(),
        None => v.to_string(),
    }
}

/// Parse one numeric cell; symbol stripping first, then a plain f64 parse.
pub fn parse_numeric(value: &str, strip: Option<SymbolStrip>) -> Option<f64> {
    strip_symbols(value, strip).parse::<f64>().ok()
}

/// Coerce every text column to its catalogue type. Returns the typed batch
/// and the per-column count of values that failed coercion (non-null text in,
/// null out).
pub fn coerce_types(batch: &RecordBatch) -> Result<(RecordBatch, BTreeMap<String, usize>)> {
    let mut fields: Vec<Field> = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    let mut failures: BTreeMap<String, usize> = BTreeMap::new();

    for (i, field) in batch.schema().fields().iter().enumerate() {
        let arr = batch.column(i);
        let spec = schema::spec_of(field.name());
        let sarr = arr.as_any().downcast_ref::<StringArray>();

        match (spec.map(|c| c.kind), sarr) {
            (Some(ColumnKind::Numeric), Some(sarr)) => {
                let strip = spec.and_then(|c| c.strip);
                let mut failed = 0usize;
                let mut b = Float64Builder::with_capacity(sarr.len());
                for opt in sarr.iter() {
                    match opt {
                        Some(v) => {
                            let parsed = parse_numeric(v, strip);
                            if parsed.is_none() {
                                failed += 1;
                            }
                            b.append_option(parsed);
                        }
                        None => b.append_null(),
                    }
                }
                if failed > 0 {
                    debug!(column = field.name().as_str(), failed, "coercion failures");
                    failures.insert(field.name().clone(), failed);
                }
                fields.push(Field::new(field.name(), DataType::Float64, true));
                columns.push(Arc::new(b.finish()) as ArrayRef);
            }
            (Some(ColumnKind::Timestamp), Some(sarr)) => {
                // unparsable rows were already dropped by rule 3; any stragglers
                // still null out rather than abort
                let mut b = TimestampMillisecondBuilder::with_capacity(sarr.len());
                for opt in sarr.iter() {
                    b.append_option(opt.and_then(parse_timestamp_millis));
                }
                fields.push(Field::new(
                    field.name(),
                    DataType::Timestamp(TimeUnit::Millisecond, None),
                    true,
                ));
                columns.push(Arc::new(b.finish()) as ArrayRef);
            }
            (Some(ColumnKind::Text), Some(sarr)) => {
                let strip = spec.and_then(|c| c.strip);
                let stripped: StringArray = sarr
                    .iter()
                    .map(|opt| opt.map(|v| strip_symbols(v, strip)))
                    .collect();
                fields.push(Field::new(field.name(), DataType::Utf8, true));
                columns.push(Arc::new(stripped) as ArrayRef);
            }
            // categorical text, or anything already typed
            _ => {
                fields.push(field.as_ref().clone());
                columns.push(arr.clone());
            }
        }
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("rebuilding batch after type coercion")?;
    Ok((batch, failures))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_currency_and_percent() {
        assert_eq!(
            parse_numeric("$6.20", Some(SymbolStrip::LeadingDollar)),
            Some(6.20)
        );
        assert_eq!(
            parse_numeric("80%", Some(SymbolStrip::TrailingPercent)),
            Some(80.0)
        );
        assert_eq!(parse_numeric("  7.5 ", None), Some(7.5));
    }

    #[test]
    fn strips_station_prefix_once() {
        assert_eq!(
            strip_symbols("S123", Some(SymbolStrip::StationPrefix)),
            "123"
        );
        // already stripped stays put
        assert_eq!(strip_symbols("123", Some(SymbolStrip::StationPrefix)), "123");
    }

    #[test]
    fn unparsable_numbers_are_none() {
        assert_eq!(parse_numeric("abc", None), None);
        assert_eq!(parse_numeric("$", Some(SymbolStrip::LeadingDollar)), None);
    }
}
