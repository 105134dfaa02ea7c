//! Agents bundled with the `agentry` binary.

pub mod notebook;

use agentry_core::process::OrchestratorBuilder;
use agentry_types::error::RegistryError;

/// Register every bundled agent on `builder`.
pub fn register(builder: OrchestratorBuilder) -> Result<OrchestratorBuilder, RegistryError> {
    builder.agent(notebook::AGENT, notebook::actions()?)
}
