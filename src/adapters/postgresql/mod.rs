//! PostgreSQL integration
//!
//! The learning platform database is read through [`PostgresSource`]; the
//! export log can optionally be kept in PostgreSQL through
//! [`PostgresStateStorage`]. Both share the pooled [`PostgresClient`].

pub mod client;
pub mod source;
pub mod state;

pub use client::{PoolSettings, PostgresClient};
pub use source::PostgresSource;
pub use state::PostgresStateStorage;
