//! Adapters for the report artifact port

pub mod file;
pub mod memory;

pub use file::FileArtifactStore;
pub use memory::InMemoryArtifactStore;
