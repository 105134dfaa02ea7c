//! Memory subsystem ports for Agentry.
//!
//! Three independent stores sit behind RPITIT traits: symbolic documents,
//! scoped files, and vector similarity. Each has a `Box*` wrapper for runtime
//! backend selection, and [`AgentMemory`] bundles them for injection into the
//! orchestrator and action handlers.

pub mod agent_memory;
pub mod box_file;
pub mod box_similarity;
pub mod box_symbolic;
pub mod ephemeral;
pub mod file;
pub mod query;
pub mod similarity;
pub mod symbolic;

pub use agent_memory::AgentMemory;
pub use box_file::BoxFileMemory;
pub use box_similarity::BoxSimilarityMemory;
pub use box_symbolic::BoxSymbolicMemory;
pub use ephemeral::{EphemeralSymbolicMemory, assign_id};
pub use file::FileMemory;
pub use similarity::SimilarityMemory;
pub use symbolic::SymbolicMemory;
