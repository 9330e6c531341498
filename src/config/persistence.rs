//! Config file load, save and validation.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::types::PollerConfig;

pub async fn load_config(path: impl AsRef<Path>) -> Result<PollerConfig> {
    let config_path = path.as_ref();

    if !tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        info!("Config file {:?} not found, using defaults", config_path);
        return Ok(PollerConfig::default());
    }

    let content = tokio::fs::read_to_string(config_path)
        .await
        .with_context(|| format!("Failed to read config: {:?}", config_path))?;
    let config: PollerConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config JSON: {:?}", config_path))?;

    validate(&config);
    info!("Loaded configuration from: {:?} ({} hosts)", config_path, config.hosts.len());
    Ok(config)
}

pub async fn save_config(config: &PollerConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write config: {:?}", path))?;
    info!("Configuration saved to: {:?}", path);
    Ok(())
}

/// Warn about settings that load fine but will not behave as written.
fn validate(config: &PollerConfig) {
    if !config.poller.poll_interval.is_finite() || config.poller.poll_interval <= 0.0 {
        warn!(
            "poll_interval {} is not positive, using {:?}",
            config.poller.poll_interval,
            config.poll_interval()
        );
    }
    if config.session.params().uses_insecure_defaults() {
        warn!("Sessions use an empty password and an all-zero Kg key");
    }
    if config.poller.supported_picmg_versions.is_empty() {
        warn!("supported_picmg_versions is empty, every host will fail the capability check");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.poller.poll_interval, 5.0);
        assert!(config.hosts.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_keeps_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poller.json");

        let mut config = PollerConfig::default();
        config.poller.poll_interval = 2.0;
        config.hosts.push(crate::config::types::HostEntry {
            hostname: "172.30.150.51".into(),
            targets: Some(vec![0, 0x72]),
        });
        save_config(&config, &path).await.unwrap();

        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded.poller.poll_interval, 2.0);
        assert_eq!(loaded.targets_for("172.30.150.51"), vec![0, 0x72]);
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config JSON"));
    }
}
