//! Column catalogue for the charging-session table.
//!
//! The catalogue is the single source of truth the cleaning stages are driven
//! by: canonical names, semantic kinds, required flags, missing-value policies
//! and symbol-strip rules all live here, so every rule is auditable in one
//! place instead of being scattered through the pipeline.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

// Canonical column names, post-rename.
pub const VEHICLE_MODEL: &str = "VehicleModel";
pub const BATTERY_CAPACITY_KWH: &str = "BatteryCapacityKwh";
pub const CHARGING_STATION_ID: &str = "ChargingStationId";
pub const CHARGING_STATION_LOCATION: &str = "ChargingStationLocation";
pub const CHARGING_START_TIME: &str = "ChargingStartTime";
pub const CHARGING_END_TIME: &str = "ChargingEndTime";
pub const ENERGY_CONSUMED_KWH: &str = "EnergyConsumedKwh";
pub const CHARGING_DURATION_HOURS: &str = "ChargingDurationHours";
pub const CHARGING_RATE_KW: &str = "ChargingRateKw";
pub const CHARGING_COST_USD: &str = "ChargingCostUsd";
pub const TIME_OF_DAY: &str = "TimeOfDay";
pub const DAY_OF_WEEK: &str = "DayOfWeek";
pub const STATE_OF_CHARGE_START_PCT: &str = "StateOfChargeStartPct";
pub const STATE_OF_CHARGE_END_PCT: &str = "StateOfChargeEndPct";
pub const DISTANCE_DRIVEN_KM: &str = "DistanceDrivenKm";
pub const TEMPERATURE_C: &str = "TemperatureC";
pub const VEHICLE_AGE_YEARS: &str = "VehicleAgeYears";
pub const CHARGER_TYPE: &str = "ChargerType";
pub const USER_TYPE: &str = "UserType";

// Engineered columns appended by the derive stage.
pub const CHARGE_DIFFERENCE_PCT: &str = "ChargeDifferencePct";
pub const CHARGING_DURATION_MINUTES: &str = "ChargingDurationMinutes";

/// Present in the raw export but dropped at load; carries no analytical value.
pub const USER_ID_RAW: &str = "user id";

/// Semantic type of a column, before Arrow types enter the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free-text label normalized to a canonical casing.
    Categorical,
    /// Opaque identifier, kept as text.
    Text,
    /// Coerced to f64.
    Numeric,
    /// Parsed to a millisecond timestamp.
    Timestamp,
}

/// Junk the raw export wraps numeric/id values in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStrip {
    /// `$12.30` -> `12.30`
    LeadingDollar,
    /// `80%` -> `80`
    TrailingPercent,
    /// `S123` -> `123`
    StationPrefix,
}

/// Per-column missing-value policy: an explicit configuration mapping, never
/// inferred at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingPolicy {
    /// The row is useless without this field; drop it.
    DropRow,
    /// Fill with the column median.
    ImputeMedian,
    /// Leave the cell null.
    Keep,
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// Header name in the raw CSV export.
    pub raw: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub policy: MissingPolicy,
    pub strip: Option<SymbolStrip>,
}

const fn col(
    name: &'static str,
    raw: &'static str,
    kind: ColumnKind,
    required: bool,
    policy: MissingPolicy,
    strip: Option<SymbolStrip>,
) -> ColumnSpec {
    ColumnSpec {
        name,
        raw,
        kind,
        required,
        policy,
        strip,
    }
}

/// The full input schema, in output column order. `ChargingDurationHours`,
/// `TimeOfDay` and `DayOfWeek` arrive dirty in the export and are recomputed
/// from the timestamps by the derive stage, so their policy is `Keep`.
pub static CATALOGUE: &[ColumnSpec] = &[
    col(
        VEHICLE_MODEL,
        "VehicleModel",
        ColumnKind::Categorical,
        true,
        MissingPolicy::DropRow,
        None,
    ),
    col(
        BATTERY_CAPACITY_KWH,
        "BatteryCapacitykWh",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        None,
    ),
    col(
        CHARGING_STATION_ID,
        "Charging_StationID",
        ColumnKind::Text,
        false,
        MissingPolicy::Keep,
        Some(SymbolStrip::StationPrefix),
    ),
    col(
        CHARGING_STATION_LOCATION,
        "Charging StationLocation",
        ColumnKind::Categorical,
        false,
        MissingPolicy::Keep,
        None,
    ),
    col(
        CHARGING_START_TIME,
        "Charging StartTime",
        ColumnKind::Timestamp,
        true,
        MissingPolicy::DropRow,
        None,
    ),
    col(
        CHARGING_END_TIME,
        "Charging EndTime",
        ColumnKind::Timestamp,
        true,
        MissingPolicy::DropRow,
        None,
    ),
    col(
        ENERGY_CONSUMED_KWH,
        "Energy ConsumedKWh",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        None,
    ),
    col(
        CHARGING_DURATION_HOURS,
        "ChargingDuration_hours",
        ColumnKind::Numeric,
        false,
        MissingPolicy::Keep,
        None,
    ),
    col(
        CHARGING_RATE_KW,
        "ChargingRateKW",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        None,
    ),
    col(
        CHARGING_COST_USD,
        "ChargingCostUSD",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        Some(SymbolStrip::LeadingDollar),
    ),
    col(
        TIME_OF_DAY,
        "TimeofDay",
        ColumnKind::Categorical,
        false,
        MissingPolicy::Keep,
        None,
    ),
    col(
        DAY_OF_WEEK,
        "DayofWeek",
        ColumnKind::Categorical,
        false,
        MissingPolicy::Keep,
        None,
    ),
    col(
        STATE_OF_CHARGE_START_PCT,
        "State_of_Charge_Start%",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        Some(SymbolStrip::TrailingPercent),
    ),
    col(
        STATE_OF_CHARGE_END_PCT,
        "State_of_Charge_End%",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        Some(SymbolStrip::TrailingPercent),
    ),
    col(
        DISTANCE_DRIVEN_KM,
        "Distance_Driven_km",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        None,
    ),
    col(
        TEMPERATURE_C,
        "TemperatureC",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        None,
    ),
    col(
        VEHICLE_AGE_YEARS,
        "VehicleAge_years",
        ColumnKind::Numeric,
        false,
        MissingPolicy::ImputeMedian,
        None,
    ),
    col(
        CHARGER_TYPE,
        "ChargerType",
        ColumnKind::Categorical,
        false,
        MissingPolicy::Keep,
        None,
    ),
    col(
        USER_TYPE,
        "UserType",
        ColumnKind::Categorical,
        false,
        MissingPolicy::Keep,
        None,
    ),
];

pub fn spec_of(name: &str) -> Option<&'static ColumnSpec> {
    CATALOGUE.iter().find(|c| c.name == name)
}

/// Columns a row cannot survive without.
pub fn required_columns() -> Vec<&'static str> {
    CATALOGUE
        .iter()
        .filter(|c| c.required)
        .map(|c| c.name)
        .collect()
}

/// Header names the raw export must carry (any order).
pub fn expected_raw_headers() -> Vec<&'static str> {
    let mut headers = vec![USER_ID_RAW];
    headers.extend(CATALOGUE.iter().map(|c| c.raw));
    headers
}

/// The missing-value policy map actually applied by a run. Defaults come from
/// the catalogue; individual columns can be overridden from a YAML file, e.g.
///
/// ```yaml
/// ChargingStationLocation: drop-row
/// TemperatureC: keep
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanPolicies {
    pub missing: BTreeMap<String, MissingPolicy>,
}

impl Default for CleanPolicies {
    fn default() -> Self {
        let missing = CATALOGUE
            .iter()
            .map(|c| (c.name.to_string(), c.policy))
            .collect();
        Self { missing }
    }
}

impl CleanPolicies {
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading policy overrides from {}", path.display()))?;
        let overrides: BTreeMap<String, MissingPolicy> =
            serde_yaml::from_str(&text).context("parsing policy overrides")?;

        let mut policies = Self::default();
        for (column, policy) in overrides {
            if spec_of(&column).is_none() {
                bail!("policy override names unknown column {column:?}");
            }
            policies.missing.insert(column, policy);
        }
        Ok(policies)
    }

    pub fn policy(&self, column: &str) -> MissingPolicy {
        self.missing
            .get(column)
            .copied()
            .unwrap_or(MissingPolicy::Keep)
    }

    /// Columns whose nulls drop the whole row, in catalogue order.
    pub fn drop_row_columns(&self) -> Vec<&'static str> {
        CATALOGUE
            .iter()
            .filter(|c| self.policy(c.name) == MissingPolicy::DropRow)
            .map(|c| c.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_covers_raw_export() {
        let headers = expected_raw_headers();
        assert_eq!(headers.len(), 20);
        assert!(headers.contains(&"user id"));
        assert!(headers.contains(&"State_of_Charge_Start%"));
    }

    #[test]
    fn required_columns_are_model_and_timestamps() {
        assert_eq!(
            required_columns(),
            vec![VEHICLE_MODEL, CHARGING_START_TIME, CHARGING_END_TIME]
        );
    }

    #[test]
    fn policy_overrides_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        fs::write(&path, "TemperatureC: keep\n").unwrap();

        let policies = CleanPolicies::from_yaml(&path).unwrap();
        assert_eq!(policies.policy(TEMPERATURE_C), MissingPolicy::Keep);
        // untouched defaults survive the merge
        assert_eq!(policies.policy(VEHICLE_MODEL), MissingPolicy::DropRow);
        assert_eq!(policies.policy(CHARGING_COST_USD), MissingPolicy::ImputeMedian);
    }

    #[test]
    fn unknown_override_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        fs::write(&path, "NoSuchColumn: keep\n").unwrap();
        assert!(CleanPolicies::from_yaml(&path).is_err());
    }
}
