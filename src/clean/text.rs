//! Rule 1: string normalization for categorical and text columns.
//!
//! Values are trimmed, stripped of trailing `#` runs (a known artefact of the
//! export), whitespace-collapsed and lowercased, then routed through
//! per-column alias tables (typo repair) and canonical tables (final display
//! casing). Labels not covered by a canonical table are title-cased so casing
//! stays consistent for categories we have not seen before.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::{self, ColumnKind};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"#+$").unwrap());

/// Values the export uses where it means "no value".
const SENTINELS: &[&str] = &["", "nan", "unknown", "n/a"];

// Typo repair, keyed on normalized (lowercase) text. Only genuinely truncated
// or misspelled variants belong here.
static VEHICLE_ALIASES: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("audi e-tro", "audi e-tron"),
        ("tesla model", "tesla model 3"),
        ("chevy bol", "chevy bolt"),
        ("nissan lea", "nissan leaf"),
        ("hyundai kon", "hyundai kona"),
    ])
});

static LOCATION_ALIASES: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("los angele", "los angeles"),
        ("new yor", "new york"),
        ("san francisc", "san francisco"),
        ("chicag", "chicago"),
        ("seattl", "seattle"),
    ])
});

static TIME_ALIASES: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("mornin", "morning"),
        ("afternoo", "afternoon"),
        ("evenin", "evening"),
        ("nigh", "night"),
    ])
});

static DAY_ALIASES: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("monda", "monday"),
        ("tuesda", "tuesday"),
        ("wednesda", "wednesday"),
        ("thursda", "thursday"),
        ("frida", "friday"),
        ("saturda", "saturday"),
        ("sunda", "sunday"),
    ])
});

static CHARGER_ALIASES: Lazy<HashMap<&str, &str>> =
    Lazy::new(|| HashMap::from([("dc fast charge", "dc fast charger")]));

static USER_ALIASES: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("commute", "commuter"),
        ("long-distance travele", "long distance traveler"),
        ("long-distance traveler", "long distance traveler"),
    ])
});

// Canonical display labels, keyed on normalized text.
static VEHICLE_CANON: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("tesla model 3", "Tesla Model 3"),
        ("chevy bolt", "Chevy Bolt"),
        ("nissan leaf", "Nissan Leaf"),
        ("hyundai kona", "Hyundai Kona"),
        ("audi e-tron", "Audi e-Tron"),
    ])
});

static LOCATION_CANON: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("los angeles", "Los Angeles"),
        ("new york", "New York"),
        ("san francisco", "San Francisco"),
        ("chicago", "Chicago"),
        ("seattle", "Seattle"),
    ])
});

static TIME_CANON: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("morning", "Morning"),
        ("afternoon", "Afternoon"),
        ("evening", "Evening"),
        ("night", "Night"),
    ])
});

static DAY_CANON: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("monday", "Monday"),
        ("tuesday", "Tuesday"),
        ("wednesday", "Wednesday"),
        ("thursday", "Thursday"),
        ("friday", "Friday"),
        ("saturday", "Saturday"),
        ("sunday", "Sunday"),
    ])
});

static CHARGER_CANON: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("level 1", "Level 1"),
        ("level 2", "Level 2"),
        ("dc fast charger", "Dc Fast Charger"),
        ("level", "Level"),
    ])
});

static USER_CANON: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("commuter", "Commuter"),
        ("long distance traveler", "Long Distance Traveler"),
    ])
});

fn alias_map(column: &str) -> Option<&'static HashMap<&'static str, &'static str>> {
    match column {
        schema::VEHICLE_MODEL => Some(&VEHICLE_ALIASES),
        schema::CHARGING_STATION_LOCATION => Some(&LOCATION_ALIASES),
        schema::TIME_OF_DAY => Some(&TIME_ALIASES),
        schema::DAY_OF_WEEK => Some(&DAY_ALIASES),
        schema::CHARGER_TYPE => Some(&CHARGER_ALIASES),
        schema::USER_TYPE => Some(&USER_ALIASES),
        _ => None,
    }
}

fn canon_map(column: &str) -> Option<&'static HashMap<&'static str, &'static str>> {
    match column {
        schema::VEHICLE_MODEL => Some(&VEHICLE_CANON),
        schema::CHARGING_STATION_LOCATION => Some(&LOCATION_CANON),
        schema::TIME_OF_DAY => Some(&TIME_CANON),
        schema::DAY_OF_WEEK => Some(&DAY_CANON),
        schema::CHARGER_TYPE => Some(&CHARGER_CANON),
        schema::USER_TYPE => Some(&USER_CANON),
        _ => None,
    }
}

/// Trim, strip trailing `#`, collapse whitespace, lowercase. Sentinel values
/// come back as `None`.
pub fn normalize_label(raw: &str) -> Option<String> {
    let s = TRAILING_HASH.replace(raw.trim(), "");
    let s = WHITESPACE.replace_all(s.trim(), " ").to_lowercase();
    if SENTINELS.contains(&s.as_str()) {
        None
    } else {
        Some(s)
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full categorical treatment for one value: normalize, repair known typos,
/// map to the canonical label, title-case anything unrecognised.
pub fn canonical_label(column: &str, raw: &str) -> Option<String> {
    let norm = normalize_label(raw)?;
    let norm = match alias_map(column).and_then(|m| m.get(norm.as_str())) {
        Some(fixed) => (*fixed).to_string(),
        None => norm,
    };
    match canon_map(column).and_then(|m| m.get(norm.as_str())) {
        Some(canon) => Some((*canon).to_string()),
        None => Some(title_case(&norm)),
    }
}

/// Identifier treatment: trim and collapse whitespace, keep casing.
pub fn normalize_text_id(raw: &str) -> Option<String> {
    let s = WHITESPACE.replace_all(raw.trim(), " ").to_string();
    if SENTINELS.contains(&s.to_lowercase().as_str()) {
        None
    } else {
        Some(s)
    }
}

/// Apply rule 1 across the batch. Only `Utf8` columns of categorical or text
/// kind are touched, so the rule is a no-op on an already-typed table.
pub fn normalize_strings(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (i, field) in batch.schema().fields().iter().enumerate() {
        let arr = batch.column(i);
        let kind = schema::spec_of(field.name()).map(|c| c.kind);
        let treat = matches!(kind, Some(ColumnKind::Categorical) | Some(ColumnKind::Text));
        if treat && field.data_type() == &DataType::Utf8 {
            let sarr = arr
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("utf8 column");
            let cleaned: StringArray = sarr
                .iter()
                .map(|opt| {
                    opt.and_then(|v| match kind {
                        Some(ColumnKind::Categorical) => canonical_label(field.name(), v),
                        _ => normalize_text_id(v),
                    })
                })
                .collect();
            columns.push(Arc::new(cleaned) as ArrayRef);
        } else {
            columns.push(arr.clone());
        }
    }

    RecordBatch::try_new(batch.schema(), columns).context("rebuilding batch after normalization")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CHARGER_TYPE, USER_TYPE, VEHICLE_MODEL};

    #[test]
    fn trims_and_canonicalizes() {
        assert_eq!(
            canonical_label(VEHICLE_MODEL, " Tesla Model 3 ").as_deref(),
            Some("Tesla Model 3")
        );
        assert_eq!(
            canonical_label(VEHICLE_MODEL, "tesla   model  3").as_deref(),
            Some("Tesla Model 3")
        );
    }

    #[test]
    fn repairs_known_typos() {
        assert_eq!(
            canonical_label(VEHICLE_MODEL, "tesla model").as_deref(),
            Some("Tesla Model 3")
        );
        assert_eq!(
            canonical_label(USER_TYPE, "long-distance travele").as_deref(),
            Some("Long Distance Traveler")
        );
        assert_eq!(
            canonical_label(CHARGER_TYPE, "dc fast charge").as_deref(),
            Some("Dc Fast Charger")
        );
    }

    #[test]
    fn strips_trailing_hash_runs() {
        assert_eq!(
            canonical_label(crate::schema::CHARGING_STATION_LOCATION, "Seattle##").as_deref(),
            Some("Seattle")
        );
    }

    #[test]
    fn sentinels_become_null() {
        assert_eq!(canonical_label(VEHICLE_MODEL, "  "), None);
        assert_eq!(canonical_label(VEHICLE_MODEL, "nan"), None);
        assert_eq!(canonical_label(VEHICLE_MODEL, "Unknown"), None);
    }

    #[test]
    fn unseen_labels_get_stable_title_case() {
        let once = canonical_label(VEHICLE_MODEL, "rivian r1t").unwrap();
        let twice = canonical_label(VEHICLE_MODEL, &once).unwrap();
        assert_eq!(once, "Rivian R1t");
        assert_eq!(once, twice);
    }

    #[test]
    fn canonical_labels_are_fixed_points() {
        for label in ["Tesla Model 3", "Audi e-Tron", "Dc Fast Charger"] {
            let col = if label.contains("Charger") {
                CHARGER_TYPE
            } else {
                VEHICLE_MODEL
            };
            assert_eq!(canonical_label(col, label).as_deref(), Some(label));
        }
    }
}
