use thiserror::Error;

#[derive(Debug, Error)]
pub enum GinzuError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Inconsistent override: {switch} is enabled but {missing} was not provided")]
    InconsistentOverride { switch: String, missing: String },

    #[error("Invalid stable state: {0}")]
    InvalidStableState(String),

    #[error("Numeric overflow in {context}")]
    NumericOverflow { context: String },
}
