use thiserror::Error;

/// Structural failures abort the pipeline; everything row-level is recovered
/// locally and recorded in the clean report instead of surfacing here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("input header mismatch: {0}")]
    Schema(String),

    #[error("malformed csv input: {0}")]
    Csv(#[from] csv::Error),

    #[error("cleaned table failed validation: {0} invariant violation(s)")]
    Validation(usize),
}
