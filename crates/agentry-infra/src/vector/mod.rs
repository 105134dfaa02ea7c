//! Vector similarity storage.

pub mod similarity;

pub use similarity::InMemorySimilarityMemory;
