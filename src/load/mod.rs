//! Reads the raw session export into an all-text table.
//!
//! Every cell is loaded as text; typing happens later in the cleaning
//! pipeline. The only contract enforced here is structural: the file must be
//! readable, parse as CSV, and carry exactly the expected header set.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tracing::{debug, instrument};

use crate::error::PipelineError;
use crate::schema::{expected_raw_headers, CATALOGUE};

/// Raw session table straight off the export: canonical headers, every field a
/// String exactly as it appeared in the file.
#[derive(Debug)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Load the export at `path`, verify the header contract, rename columns to
/// their canonical names and drop the `user id` column.
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_sessions_csv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let file = File::open(&path)
        .map_err(PipelineError::Io)
        .with_context(|| format!("opening {}", path.as_ref().display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let found: Vec<String> = rdr
        .headers()
        .map_err(PipelineError::Csv)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    check_headers(&found)?;

    // Column order of the output is the catalogue's, not the file's.
    let indices: Vec<usize> = CATALOGUE
        .iter()
        .map(|c| found.iter().position(|h| h == c.raw).expect("header checked"))
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result
            .map_err(PipelineError::Csv)
            .with_context(|| format!("csv parse error at record {idx}"))?;
        let row: Vec<String> = indices
            .iter()
            .map(|&i| record.get(i).unwrap_or("").to_string())
            .collect();
        rows.push(row);
    }
    // file handle goes out of scope here; nothing else is held open

    debug!(rows = rows.len(), "raw table loaded");
    Ok(RawTable {
        headers: CATALOGUE.iter().map(|c| c.name.to_string()).collect(),
        rows,
    })
}

fn check_headers(found: &[String]) -> Result<()> {
    let expected: HashSet<&str> = expected_raw_headers().into_iter().collect();
    let got: HashSet<&str> = found.iter().map(String::as_str).collect();

    let missing: Vec<&str> = expected
        .iter()
        .filter(|h| !got.contains(**h))
        .copied()
        .collect();
    let unexpected: Vec<&str> = got
        .iter()
        .filter(|h| !expected.contains(**h))
        .copied()
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing columns {missing:?}"));
        }
        if !unexpected.is_empty() {
            parts.push(format!("unexpected columns {unexpected:?}"));
        }
        return Err(PipelineError::Schema(parts.join("; ")).into());
    }
    if found.len() != expected.len() {
        return Err(PipelineError::Schema(format!(
            "duplicate columns in header ({} found, {} expected)",
            found.len(),
            expected.len()
        ))
        .into());
    }
    Ok(())
}

/// Build the all-`Utf8`, fully nullable starting batch. Blank or
/// whitespace-only cells become nulls so the missing-value rules see them.
pub fn raw_to_batch(raw: &RawTable) -> Result<RecordBatch> {
    let fields: Vec<Field> = raw
        .headers
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.len());
    for i in 0..raw.headers.len() {
        let col: StringArray = raw
            .rows
            .iter()
            .map(|row| {
                let v = row[i].as_str();
                if v.trim().is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
            .collect();
        columns.push(Arc::new(col) as ArrayRef);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context("building raw batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use arrow::array::Array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "user id,VehicleModel,BatteryCapacitykWh,Charging_StationID,Charging StationLocation,Charging StartTime,Charging EndTime,Energy ConsumedKWh,ChargingDuration_hours,ChargingRateKW,ChargingCostUSD,TimeofDay,DayofWeek,State_of_Charge_Start%,State_of_Charge_End%,Distance_Driven_km,TemperatureC,VehicleAge_years,ChargerType,UserType";

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "{HEADER}").unwrap();
        for line in lines {
            writeln!(tmp, "{line}").unwrap();
        }
        tmp
    }

    #[test]
    fn loads_and_renames_columns() {
        let tmp = write_csv(&[
            "U1, Tesla Model 3 ,60,S123,Seattle#,2024-01-05 08:00,2024-01-05 09:30,22.5,1.5,11.0,$6.20,Morning,Friday,20%,65%,120,7.5,2,Level 2,Commuter",
        ]);
        let raw = load_sessions_csv(tmp.path()).unwrap();
        assert_eq!(raw.headers.len(), schema::CATALOGUE.len());
        assert_eq!(raw.headers[0], schema::VEHICLE_MODEL);
        assert_eq!(raw.rows.len(), 1);
        // user id dropped, model first per catalogue order
        assert_eq!(raw.rows[0][0], " Tesla Model 3 ");
    }

    #[test]
    fn header_mismatch_is_a_schema_error() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "foo,bar").unwrap();
        writeln!(tmp, "1,2").unwrap();

        let err = load_sessions_csv(tmp.path()).unwrap_err();
        let schema_err = err
            .downcast_ref::<PipelineError>()
            .expect("should be a PipelineError");
        assert!(matches!(schema_err, PipelineError::Schema(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_sessions_csv("/no/such/file.csv").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Io(_))
        ));
    }

    #[test]
    fn blank_cells_become_nulls() {
        let tmp = write_csv(&[
            "U1,,60,S123,Seattle,2024-01-05 08:00,2024-01-05 09:30,22.5,1.5,11.0,$6.20,Morning,Friday,20%,65%,120,7.5,2,Level 2,Commuter",
        ]);
        let raw = load_sessions_csv(tmp.path()).unwrap();
        let batch = raw_to_batch(&raw).unwrap();
        let model = batch
            .column_by_name(schema::VEHICLE_MODEL)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(model.is_null(0));
    }
}
