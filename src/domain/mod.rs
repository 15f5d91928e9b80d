//! Domain models and types for Quarry.
//!
//! This module contains the core domain types shared by every pipeline stage.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`DatatypeName`])
//! - **Source rows** ([`SourceRow`], [`SourceRows`]) as read from the platform database
//! - **Mapped records** ([`MappedRecord`], [`Crud`]) as written to export artifacts
//! - **Error types** ([`QuarryError`]) and the [`Result`] alias
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, QuarryError>`]:
//!
//! ```rust
//! use quarry::domain::{QuarryError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(QuarryError::Schema("unknown datatype 'widgets'".to_string()))
//! }
//! ```

pub mod errors;
pub mod ids;
pub mod record;
pub mod result;
pub mod row;

// Re-export commonly used types for convenience
pub use errors::QuarryError;
pub use ids::DatatypeName;
pub use record::{Crud, MappedRecord};
pub use result::Result;
pub use row::{SourceRow, SourceRows};
