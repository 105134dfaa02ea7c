use std::sync::Arc;

use agentry_types::process::ProcessId;

use crate::memory::AgentMemory;

/// Everything a handler may depend on for one invocation.
#[derive(Clone)]
pub struct ActionContext {
    pub process_id: ProcessId,
    pub agent: String,
    pub action: String,
    pub memory: Arc<AgentMemory>,
    pub callback_url: Option<String>,
}

impl ActionContext {
    /// File memory scope private to this process: `{agent}/{process_id}`.
    pub fn file_scope(&self) -> String {
        format!("{}/{}", self.agent, self.process_id)
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("process_id", &self.process_id)
            .field("agent", &self.agent)
            .field("action", &self.action)
            .field("callback_url", &self.callback_url)
            .finish()
    }
}
