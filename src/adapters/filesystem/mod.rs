//! Local filesystem adapters
//!
//! - [`store`] - one JSON-lines artifact per datatype
//! - [`state`] - the export log as one atomically replaced JSON document
//! - [`manifest`] - the run manifest written on completion

pub mod manifest;
pub mod state;
pub mod store;

pub use manifest::{LogNotifier, ManifestNotifier};
pub use state::FileStateStorage;
pub use store::FileArtifactStore;
