//! Cleaning pipeline for EV charging-session exports: load a raw CSV, run the
//! ordered cleaning rules, validate invariants, and hand back a typed Arrow
//! table plus a diagnostic report.

pub mod clean;
pub mod error;
pub mod export;
pub mod load;
pub mod schema;
pub mod stats;
pub mod validate;

pub use clean::CleanReport;
pub use error::PipelineError;
pub use schema::CleanPolicies;
pub use validate::ValidationReport;
