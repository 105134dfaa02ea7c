//! Processes: the durable transition log and the orchestrator driving it.

pub mod orchestrator;
pub mod store;

pub use orchestrator::{OrchestratorBuilder, ProcessOrchestrator};
pub use store::ProcessStore;
