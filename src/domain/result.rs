//! Result type alias for Quarry
//!
//! This module provides a convenient Result type alias that uses QuarryError
//! as the error type.

use super::errors::QuarryError;

/// Result type alias for Quarry operations
///
/// # Examples
///
/// ```
/// use quarry::domain::result::Result;
/// use quarry::domain::errors::QuarryError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(QuarryError::Schema("unknown datatype".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, QuarryError>;
