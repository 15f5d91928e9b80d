//! Adapter seams
//!
//! [`traits`] defines the interfaces the pipeline talks to; [`factory`]
//! picks the implementation for each from configuration.

pub mod factory;
pub mod traits;

pub use factory::{create_artifact_store, create_notifier, create_source, create_state_storage};
pub use traits::{
    ArtifactInfo, ArtifactStore, CompletionNotifier, RunCompletion, RunLease, SourceDatabase,
    StateStorage,
};
