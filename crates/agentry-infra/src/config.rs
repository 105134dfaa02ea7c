//! Configuration loader for Agentry.
//!
//! Reads `agentry.toml` from the data directory (`~/.agentry/` in production)
//! and deserializes it into [`AgentryConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use agentry_types::config::AgentryConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "AGENTRY_DATA_DIR";
/// Configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "agentry.toml";

/// Resolve the data directory: `AGENTRY_DATA_DIR`, then `~/.agentry`, then
/// `./.agentry` when no home directory is known.
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var(DATA_DIR_ENV).ok())
}

fn data_dir_from(env_value: Option<String>) -> PathBuf {
    match env_value.filter(|v| !v.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .map(|home| home.join(".agentry"))
            .unwrap_or_else(|| PathBuf::from(".agentry")),
    }
}

/// Load configuration from `{data_dir}/agentry.toml`.
///
/// - If the file does not exist, returns [`AgentryConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config; omitted keys take their defaults.
pub async fn load_config(data_dir: &Path) -> AgentryConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return AgentryConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AgentryConfig::default();
        }
    };

    match toml::from_str::<AgentryConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AgentryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_types::config::SymbolicBackend;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config, AgentryConfig::default());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[server]
port = 9100

[callback]
max_attempts = 5

[memory]
symbolic = "ephemeral"
file = "none"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.callback.max_attempts, 5);
        assert_eq!(config.memory.symbolic, SymbolicBackend::Ephemeral);
        assert_eq!(config.dispatch.workers, 16);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config, AgentryConfig::default());
    }

    #[test]
    fn data_dir_prefers_env_value() {
        assert_eq!(
            data_dir_from(Some("/srv/agentry".to_string())),
            PathBuf::from("/srv/agentry")
        );
    }

    #[test]
    fn data_dir_falls_back_to_home() {
        let dir = data_dir_from(None);
        assert!(dir.ends_with(".agentry"));
        assert_eq!(data_dir_from(Some("  ".to_string())), dir);
    }
}
