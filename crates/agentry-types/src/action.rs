use serde::{Deserialize, Serialize};

/// Public description of a registered action, as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub name: String,
    pub allowed_states: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    /// True when the action creates new processes.
    pub initializer: bool,
}

/// Public description of a registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub name: String,
    pub actions: Vec<String>,
}
