//! Process domain types.
//!
//! A process is a long-lived interaction with an agent. Its history is an
//! append-only log of [`ProcessTransition`]s; the current state is always the
//! most recently committed transition.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Virtual state of a process that does not exist yet. Never persisted.
pub const UNINITIALIZED: &str = "UNINITIALIZED";
/// Transient state committed before a handler runs.
pub const PROCESSING: &str = "processing";
/// Final state; no action may resume from it.
pub const TERMINATED: &str = "terminated";
/// A handler reported a failure meant for the caller.
pub const HTTP_ERROR: &str = "http_error";
/// A handler failed unexpectedly.
pub const UNHANDLED_ERROR: &str = "unhandled_error";

/// Returns true for states owned by the orchestrator rather than by agents.
pub fn is_reserved_state(state: &str) -> bool {
    matches!(
        state,
        UNINITIALIZED | PROCESSING | TERMINATED | HTTP_ERROR | UNHANDLED_ERROR
    )
}

/// Fixed-width RFC 3339 rendering (microseconds, `Z` suffix).
///
/// Timestamps stored in memory documents use this form so that lexical
/// order matches chronological order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Unique identifier for a process, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub Uuid);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One immutable entry in a process's state log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTransition {
    pub process_id: ProcessId,
    pub agent: String,
    pub state: String,
    pub data: serde_json::Value,
    /// When the process was created (copied onto every transition).
    pub created_at: DateTime<Utc>,
    /// When this transition was committed.
    pub updated_at: DateTime<Utc>,
}

/// The externally visible view of a process at its latest transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub process_id: ProcessId,
    pub agent: String,
    pub state: String,
    pub data: serde_json::Value,
    /// Names of actions whose allowed states contain `state`.
    pub available_actions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessSnapshot {
    /// The recorded status code and detail when the process ended in `http_error`.
    pub fn user_failure(&self) -> Option<(u16, String)> {
        if self.state != HTTP_ERROR {
            return None;
        }
        let status_code = self
            .data
            .get("status_code")
            .and_then(|v| v.as_u64())
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(500);
        let detail = match self.data.get("detail") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Some((status_code, detail))
    }

    /// The recorded error message when the process ended in `unhandled_error`.
    pub fn unhandled_failure(&self) -> Option<String> {
        if self.state != UNHANDLED_ERROR {
            return None;
        }
        Some(
            self.data
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        )
    }
}

/// Acknowledgment returned for background dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    pub process_id: ProcessId,
    pub accepted: bool,
}

impl DispatchAck {
    pub fn accepted(process_id: ProcessId) -> Self {
        Self {
            process_id,
            accepted: true,
        }
    }
}

/// Result of a dispatch: a full snapshot (sync) or an acknowledgment (background).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchOutcome {
    Completed(ProcessSnapshot),
    Accepted(DispatchAck),
}

impl DispatchOutcome {
    pub fn process_id(&self) -> ProcessId {
        match self {
            DispatchOutcome::Completed(snapshot) => snapshot.process_id,
            DispatchOutcome::Accepted(ack) => ack.process_id,
        }
    }
}

/// How a dispatch is executed relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The caller waits for the terminal transition.
    Sync,
    /// The caller gets an acknowledgment; the work runs on the background pool.
    Background,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sync => write!(f, "sync"),
            ExecutionMode::Background => write!(f, "background"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sync" => Ok(ExecutionMode::Sync),
            "async" | "background" => Ok(ExecutionMode::Background),
            other => Err(format!("invalid execution mode: '{other}'")),
        }
    }
}

/// A caller's request to run one action.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub agent: String,
    pub action: String,
    /// Absent for initializer actions, required otherwise.
    pub process_id: Option<ProcessId>,
    pub input: serde_json::Value,
    /// Explicit mode preference; resolved from `callback_url` when absent.
    pub mode: Option<ExecutionMode>,
    pub callback_url: Option<String>,
}

impl DispatchRequest {
    pub fn new(agent: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            action: action.into(),
            process_id: None,
            input: serde_json::Value::Null,
            mode: None,
            callback_url: None,
        }
    }

    pub fn process(mut self, process_id: ProcessId) -> Self {
        self.process_id = Some(process_id);
        self
    }

    pub fn input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

/// One row of a process listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub process_id: ProcessId,
    pub state: String,
    pub updated_at: DateTime<Utc>,
}
