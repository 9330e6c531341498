//! Poller configuration structs and defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::logging::normalize_level;
use crate::hardware::picmg::SUPPORTED_MAJOR_VERSIONS;
use crate::hardware::transport::{Privilege, SessionParams, BMC_SLAVE_ADDR};
use crate::hardware::types::{TargetAddress, SELF_TARGET};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub bridging: BridgingSettings,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    pub poll_interval: f64, // seconds between keep-alive + periodic refresh
    pub log_level: String,
    #[serde(default = "default_supported_versions")]
    pub supported_picmg_versions: Vec<u8>,
}

pub fn default_supported_versions() -> Vec<u8> {
    SUPPORTED_MAJOR_VERSIONS.to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub username: String,
    pub password: String,
    pub privilege: Privilege,
    pub lookup_bit: u8,
    pub kg_key: [u8; 20],
    pub local_address: u8,
}

/// Fixed MicroTCA topology: targets hang off the MCH carrier manager.
/// `default_targets` (the host itself unless configured) are polled from the
/// start; others are learned from jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgingSettings {
    pub transit_address: u8,
    pub transit_channel: u8,
    pub target_channel: u8,
    pub default_targets: Vec<TargetAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<TargetAddress>>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: 5.0,
            log_level: "INFO".to_string(),
            supported_picmg_versions: default_supported_versions(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        // Empty user/password and an all-zero Kg: weak, kept as-is and warned about on connect
        Self {
            username: String::new(),
            password: String::new(),
            privilege: Privilege::Administrator,
            lookup_bit: 0x10,
            kg_key: [0; 20],
            local_address: BMC_SLAVE_ADDR,
        }
    }
}

impl Default for BridgingSettings {
    fn default() -> Self {
        Self {
            transit_address: 0x82,
            transit_channel: 0,
            target_channel: 7,
            default_targets: vec![SELF_TARGET],
        }
    }
}

impl SessionSettings {
    pub fn params(&self) -> SessionParams {
        SessionParams {
            username: self.username.clone(),
            password: self.password.clone(),
            privilege: self.privilege,
            lookup_bit: self.lookup_bit,
            kg_key: self.kg_key,
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        let secs = if self.poller.poll_interval.is_finite() && self.poller.poll_interval > 0.0 {
            self.poller.poll_interval
        } else {
            0.0
        };
        Duration::from_secs_f64(secs).max(MIN_POLL_INTERVAL)
    }

    /// Filter directive for `app::logging::init_tracing`.
    pub fn log_filter(&self) -> &'static str {
        normalize_level(&self.poller.log_level)
    }

    /// Targets polled for `hostname`: its own list, or the bridging default.
    pub fn targets_for(&self, hostname: &str) -> Vec<TargetAddress> {
        self.hosts
            .iter()
            .find(|h| h.hostname == hostname)
            .and_then(|h| h.targets.clone())
            .unwrap_or_else(|| self.bridging.default_targets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_microtca_mch() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.bridging.transit_address, 0x82);
        assert_eq!(config.bridging.target_channel, 7);
        assert_eq!(config.session.local_address, 0x20);
        assert_eq!(config.bridging.default_targets, vec![SELF_TARGET]);
        assert_eq!(config.poller.supported_picmg_versions, vec![2, 4, 5]);
        assert!(config.session.params().uses_insecure_defaults());
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn poll_interval_is_clamped() {
        let mut config = PollerConfig::default();
        config.poller.poll_interval = 0.0;
        assert_eq!(config.poll_interval(), MIN_POLL_INTERVAL);
        config.poller.poll_interval = f64::NAN;
        assert_eq!(config.poll_interval(), MIN_POLL_INTERVAL);
        config.poller.poll_interval = 1.5;
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
    }

    #[test]
    fn per_host_targets_override_default() {
        let mut config = PollerConfig::default();
        config.hosts.push(HostEntry { hostname: "mch-1".into(), targets: Some(vec![0, 0x72, 0x74]) });
        config.hosts.push(HostEntry { hostname: "mch-2".into(), targets: None });

        assert_eq!(config.targets_for("mch-1"), vec![0, 0x72, 0x74]);
        assert_eq!(config.targets_for("mch-2"), vec![SELF_TARGET]);

        config.bridging.default_targets = vec![0x72];
        assert_eq!(config.targets_for("elsewhere"), vec![0x72]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PollerConfig =
            serde_json::from_str(r#"{"hosts":[{"hostname":"10.0.0.5","targets":[0,114]}]}"#).unwrap();
        assert_eq!(config.poller.poll_interval, 5.0);
        assert_eq!(config.session.privilege, Privilege::Administrator);
        assert_eq!(config.targets_for("10.0.0.5"), vec![0, 114]);
    }
}
