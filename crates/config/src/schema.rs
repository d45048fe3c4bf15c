/// Config schema types (gateway, discovery, storage).
use std::{collections::BTreeMap, path::PathBuf};

use {
    serde::{Deserialize, Serialize},
    smarthub_common::SlaveKind,
};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub gateway: GatewayConfig,
    pub discovery: DiscoveryConfig,
    pub storage: StorageConfig,
}

/// Listener settings for the real-time channel server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// WebSocket route slaves connect to.
    pub path: String,
    /// Largest inbound frame in bytes.
    pub max_message_bytes: usize,
    /// When false, `InitDevice`/`InitSensor`/`TurnOn`/`TurnOff` always
    /// answer `false`, which is what existing slave firmware expects.
    /// When true they answer with the actual outcome.
    pub report_outcomes: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5000,
            path: "/smarthouse".into(),
            max_message_bytes: smarthub_protocol::MAX_PAYLOAD_BYTES,
            report_outcomes: false,
        }
    }
}

/// Data the discovery broadcaster advertises. The hub only consumes it; the
/// broadcast itself runs elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// UDP port discovery requests arrive on.
    pub port_to_listen: u16,
    /// Address slaves use to reach the hub.
    pub hub_url: String,
    pub url_for_init: String,
    pub url_for_listen: String,
    /// Method-address templates keyed by slave kind (`device`, `sensor`).
    pub method_urls: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite file; relative paths resolve against the data directory.
    /// Defaults to `<data_dir>/smarthub.db`.
    pub db_path: Option<String>,
}

impl StorageConfig {
    /// Absolute location of the SQLite file.
    pub fn resolved_db_path(&self) -> PathBuf {
        let data_dir = crate::loader::data_dir();
        match self.db_path.as_deref() {
            Some(path) => data_dir.join(path),
            None => data_dir.join("smarthub.db"),
        }
    }
}

impl DiscoveryConfig {
    /// Method-address template for a slave kind, if configured.
    pub fn method_url(&self, kind: SlaveKind) -> Option<&str> {
        self.method_urls.get(kind.as_str()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: HubConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, HubConfig::default());
        assert_eq!(cfg.gateway.path, "/smarthouse");
        assert_eq!(cfg.gateway.max_message_bytes, 3_072_000);
        assert!(!cfg.gateway.report_outcomes);
    }

    #[test]
    fn method_urls_keyed_by_kind() {
        let cfg: HubConfig = toml::from_str(
            r#"
            [discovery]
            port_to_listen = 8888
            hub_url = "http://10.0.0.2:5000/smarthouse"

            [discovery.method_urls]
            device = "http://10.0.0.2:5000/api/devices/{mac}"
            sensor = "http://10.0.0.2:5000/api/sensors/{mac}"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.discovery.port_to_listen, 8888);
        assert_eq!(
            cfg.discovery.method_url(SlaveKind::Sensor),
            Some("http://10.0.0.2:5000/api/sensors/{mac}")
        );
        assert_eq!(cfg.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn absolute_db_path_is_kept() {
        let storage = StorageConfig {
            backend: StorageBackend::Sqlite,
            db_path: Some("/srv/hub/state.db".into()),
        };
        assert_eq!(storage.resolved_db_path(), PathBuf::from("/srv/hub/state.db"));
    }
}
