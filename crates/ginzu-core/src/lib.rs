pub mod error;
pub mod types;
pub mod valuation;

pub use error::GinzuError;
pub use types::*;

/// Standard result type for all valuation operations
pub type GinzuResult<T> = Result<T, GinzuError>;
