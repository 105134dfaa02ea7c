//! Application state wiring configuration, memory and the orchestrator.
//!
//! AppState is shared by the CLI commands and the REST handlers. Memory
//! backends are picked from `agentry.toml` and started here; `shutdown`
//! drains background work before stopping them.

use std::path::PathBuf;
use std::sync::Arc;

use agentry_core::callback::BoxCallbackNotifier;
use agentry_core::process::ProcessOrchestrator;
use agentry_infra::callback::HttpCallbackNotifier;
use agentry_infra::config::{load_config, resolve_data_dir};
use agentry_infra::memory::build_agent_memory;
use agentry_types::config::AgentryConfig;

use crate::agents;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ProcessOrchestrator,
    pub config: Arc<AgentryConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load `agentry.toml` and wire everything.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_config(&data_dir).await;
        Self::from_config(config, data_dir).await
    }

    /// Wire state from an already loaded configuration.
    pub async fn from_config(config: AgentryConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let memory = Arc::new(build_agent_memory(&config.memory, &data_dir));
        memory.start().await?;

        let notifier = HttpCallbackNotifier::new(&config.callback)?;
        let builder = ProcessOrchestrator::builder(memory)
            .dispatch_config(&config.dispatch)
            .notifier(BoxCallbackNotifier::new(notifier));
        let orchestrator = agents::register(builder)?.build();

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");
        Ok(Self {
            orchestrator,
            config: Arc::new(config),
            data_dir,
        })
    }

    /// Wait for accepted background work, then stop the memory stores.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.orchestrator.shutdown().await;
        self.orchestrator.memory().stop().await?;
        Ok(())
    }
}
