//! Events published by the orchestrator as processes move between states.
//!
//! `ProcessEvent` is the message type on the broadcast event bus. Consumers
//! (CLI watchers, tests, callback bookkeeping) subscribe without touching the
//! process log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::ProcessId;

/// Lifecycle events for processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// A transition was committed to the process log.
    Transitioned {
        process_id: ProcessId,
        agent: String,
        action: String,
        state: String,
        at: DateTime<Utc>,
    },

    /// A background dispatch was accepted for later execution.
    Accepted {
        process_id: ProcessId,
        agent: String,
        action: String,
    },

    /// The final snapshot was delivered to the caller's callback url.
    CallbackDelivered { process_id: ProcessId, url: String },

    /// Callback delivery gave up. The committed transition is unaffected.
    CallbackFailed {
        process_id: ProcessId,
        url: String,
        error: String,
    },
}

impl ProcessEvent {
    pub fn process_id(&self) -> ProcessId {
        match self {
            ProcessEvent::Transitioned { process_id, .. }
            | ProcessEvent::Accepted { process_id, .. }
            | ProcessEvent::CallbackDelivered { process_id, .. }
            | ProcessEvent::CallbackFailed { process_id, .. } => *process_id,
        }
    }
}
