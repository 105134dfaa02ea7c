//! Configuration types for Agentry.
//!
//! `AgentryConfig` represents the top-level `agentry.toml` that controls the
//! HTTP listener, background execution, callback delivery and memory backends.

use serde::{Deserialize, Serialize};

/// Top-level configuration. Loaded from `~/.agentry/agentry.toml`; every field
/// has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentryConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8420
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Dispatch and listing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum background dispatches running at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upper bound for a listing page.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
    /// Capacity of the process event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_workers() -> usize {
    16
}

fn default_max_page_size() -> u64 {
    100
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_page_size: default_max_page_size(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Completion callback delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Per-attempt request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts, including the first. Values below 2 are raised to 2.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * backoff_ms`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl CallbackConfig {
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(2)
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Backend for the symbolic store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolicBackend {
    #[default]
    Sqlite,
    /// In-process and lost on exit.
    Ephemeral,
}

/// Backend for the file store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileBackend {
    #[default]
    Local,
    None,
}

/// Backend for the similarity store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityBackend {
    #[default]
    Memory,
    None,
}

/// Memory subsystem backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub symbolic: SymbolicBackend,
    #[serde(default)]
    pub file: FileBackend,
    #[serde(default)]
    pub similarity: SimilarityBackend,
    /// Overrides the default `sqlite://{data_dir}/agentry.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Overrides the default `{data_dir}/files`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_root: Option<String>,
}
