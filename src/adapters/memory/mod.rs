//! In-memory adapters
//!
//! Used for dry runs, where nothing may be persisted, and as test doubles.
//! Everything lives behind `tokio::sync::Mutex`es and is lost on drop.

pub mod source;
pub mod state;
pub mod store;

pub use source::MemorySource;
pub use state::MemoryStateStorage;
pub use store::MemoryArtifactStore;
