use thiserror::Error;

/// Errors from memory store operations (used by trait definitions in agentry-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("memory store not started")]
    NotStarted,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Errors returned to the caller of a dispatch, status or list operation.
///
/// Handler failures are not represented here: they are committed to the
/// process log as `http_error` / `unhandled_error` transitions instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("action '{action}' cannot run while the process is in state '{state}'")]
    Conflict { action: String, state: String },

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    pub fn agent_not_found(agent: &str) -> Self {
        Self::NotFound {
            kind: "agent",
            id: agent.to_string(),
        }
    }

    pub fn action_not_found(action: &str) -> Self {
        Self::NotFound {
            kind: "action",
            id: action.to_string(),
        }
    }

    pub fn process_not_found(process_id: impl ToString) -> Self {
        Self::NotFound {
            kind: "process",
            id: process_id.to_string(),
        }
    }
}

/// Failure raised by an action handler.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A failure meant for the caller, recorded as `http_error`.
    #[error("{detail}")]
    User { status_code: u16, detail: String },

    /// Anything else, recorded as `unhandled_error`.
    #[error("{0}")]
    Unhandled(String),
}

impl ActionError {
    pub fn user(status_code: u16, detail: impl Into<String>) -> Self {
        Self::User {
            status_code,
            detail: detail.into(),
        }
    }

    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::Unhandled(message.into())
    }
}

impl From<RepositoryError> for ActionError {
    fn from(e: RepositoryError) -> Self {
        Self::Unhandled(e.to_string())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unhandled(e.to_string())
    }
}

/// Errors raised while assembling action registries and agents.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("action '{0}' is registered more than once")]
    DuplicateAction(String),

    #[error("action '{0}' declares no allowed states")]
    EmptyStates(String),

    #[error("action '{0}' cannot be allowed to run from the terminated state")]
    TerminatedState(String),

    #[error("action '{0}' mixes UNINITIALIZED with other states")]
    MixedInitializer(String),

    #[error("agent '{0}' is registered more than once")]
    DuplicateAgent(String),

    #[error("agent '{0}' has no initializer action")]
    NoInitializer(String),
}

/// Errors from delivering a completion callback.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("invalid callback url: {0}")]
    InvalidUrl(String),

    #[error("callback delivery failed after {attempts} attempt(s): {message}")]
    Delivery { attempts: u32, message: String },
}
