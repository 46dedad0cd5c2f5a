//! Gateway settings file.
//!
//! A JSON document describing which plugin to load and how to bind it. The
//! daemon reads it with [`GatewaySettings::load`] and lets command-line flags
//! override individual fields before calling [`GatewaySettings::validate`].
//!
//! ```json
//! {
//!   "plugin": "/opt/gateway/libsomeip_transport.so",
//!   "networkInterface": "eth0",
//!   "ipAddress": "192.168.1.10",
//!   "manifests": ["/etc/gateway/someip.json"],
//!   "transformations": ["/opt/gateway/libpayload_codec.so"],
//!   "cycleTimeMs": 10,
//!   "numCycles": 0
//! }
//! ```

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySettings {
    /// Path of the transport plugin shared library.
    #[serde(default)]
    pub plugin: Option<PathBuf>,

    #[serde(default = "default_network_interface")]
    pub network_interface: String,

    #[serde(default = "default_ip_address")]
    pub ip_address: String,

    /// Transport configuration files passed through to the plugin.
    #[serde(default)]
    pub manifests: Vec<PathBuf>,

    /// Payload transformation plugins bound to the gateway runtime.
    #[serde(default)]
    pub transformations: Vec<PathBuf>,

    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u64,

    /// 0 polls until stopped.
    #[serde(default)]
    pub num_cycles: usize,
}

fn default_network_interface() -> String {
    GatewayConfig::DEFAULT_NETWORK_INTERFACE.to_string()
}

fn default_ip_address() -> String {
    GatewayConfig::DEFAULT_IP_ADDRESS.to_string()
}

fn default_cycle_time_ms() -> u64 {
    GatewayConfig::DEFAULT_CYCLE_TIME.as_millis() as u64
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            plugin: None,
            network_interface: default_network_interface(),
            ip_address: default_ip_address(),
            manifests: Vec::new(),
            transformations: Vec::new(),
            cycle_time_ms: default_cycle_time_ms(),
            num_cycles: GatewayConfig::DEFAULT_NUM_CYCLES,
        }
    }
}

impl GatewaySettings {
    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| GatewayError::io_with_path(e, path))?;

        let settings: GatewaySettings =
            serde_json::from_str(&content).map_err(|e| GatewayError::Json {
                message: format!("Failed to parse settings from {}: {}", path.display(), e),
                source: Some(e),
            })?;

        debug!("Loaded gateway settings from {}", path.display());
        Ok(settings)
    }

    /// Check that the settings describe a runnable gateway.
    pub fn validate(&self) -> Result<()> {
        match &self.plugin {
            None => {
                return Err(GatewayError::Config {
                    message: "no transport plugin configured".into(),
                })
            }
            Some(path) if path.as_os_str().is_empty() => {
                return Err(GatewayError::Config {
                    message: "transport plugin path is empty".into(),
                })
            }
            Some(_) => {}
        }

        if self.network_interface.trim().is_empty() {
            return Err(GatewayError::Config {
                message: "network interface is empty".into(),
            });
        }

        if self.ip_address.parse::<IpAddr>().is_err() {
            return Err(GatewayError::Config {
                message: format!("'{}' is not a valid IP address", self.ip_address),
            });
        }

        if self.cycle_time_ms == 0 {
            return Err(GatewayError::Config {
                message: "cycle time must be at least 1 ms".into(),
            });
        }

        if let Some(empty) = self.manifests.iter().position(|m| m.as_os_str().is_empty()) {
            return Err(GatewayError::Config {
                message: format!("manifest #{} has an empty path", empty + 1),
            });
        }

        if let Some(empty) = self
            .transformations
            .iter()
            .position(|t| t.as_os_str().is_empty())
        {
            return Err(GatewayError::Config {
                message: format!("payload transformation #{} has an empty path", empty + 1),
            });
        }

        Ok(())
    }

    pub fn cycle_time(&self) -> Duration {
        Duration::from_millis(self.cycle_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> GatewaySettings {
        GatewaySettings {
            plugin: Some(PathBuf::from("/opt/gateway/libtransport.so")),
            ..GatewaySettings::default()
        }
    }

    #[test]
    fn test_load_applies_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gateway.json");
        std::fs::write(&path, r#"{ "plugin": "libtransport.so", "numCycles": 5 }"#).unwrap();

        let settings = GatewaySettings::load(&path).unwrap();
        assert_eq!(settings.plugin, Some(PathBuf::from("libtransport.so")));
        assert_eq!(settings.num_cycles, 5);
        assert_eq!(settings.network_interface, "lo");
        assert_eq!(settings.ip_address, "127.0.0.1");
        assert_eq!(settings.cycle_time(), GatewayConfig::DEFAULT_CYCLE_TIME);
        assert!(settings.manifests.is_empty());
        assert!(settings.transformations.is_empty());
    }

    #[test]
    fn test_load_full_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gateway.json");
        std::fs::write(
            &path,
            r#"{
                "plugin": "/opt/libsomeip.so",
                "networkInterface": "eth0",
                "ipAddress": "192.168.1.10",
                "manifests": ["/etc/a.json", "/etc/b.json"],
                "transformations": ["/opt/libcodec.so"],
                "cycleTimeMs": 25,
                "numCycles": 0
            }"#,
        )
        .unwrap();

        let settings = GatewaySettings::load(&path).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.network_interface, "eth0");
        assert_eq!(settings.ip_address, "192.168.1.10");
        assert_eq!(settings.manifests.len(), 2);
        assert_eq!(settings.transformations, vec![PathBuf::from("/opt/libcodec.so")]);
        assert_eq!(settings.cycle_time(), Duration::from_millis(25));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.json");
        let err = GatewaySettings::load(&path).unwrap_err();
        assert!(matches!(err, GatewayError::Io { path: Some(_), .. }));
        assert_eq!(err.exit_code(), 8);
    }

    #[test]
    fn test_load_malformed_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gateway.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = GatewaySettings::load(&path).unwrap_err();
        assert!(matches!(err, GatewayError::Json { .. }));
    }

    #[test]
    fn test_validate_accepts_defaults_with_plugin() {
        valid().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            GatewaySettings::default(),
            GatewaySettings {
                plugin: Some(PathBuf::new()),
                ..valid()
            },
            GatewaySettings {
                network_interface: "  ".into(),
                ..valid()
            },
            GatewaySettings {
                ip_address: "not-an-ip".into(),
                ..valid()
            },
            GatewaySettings {
                cycle_time_ms: 0,
                ..valid()
            },
            GatewaySettings {
                manifests: vec![PathBuf::from("a.json"), PathBuf::new()],
                ..valid()
            },
            GatewaySettings {
                transformations: vec![PathBuf::new()],
                ..valid()
            },
        ];

        for settings in cases {
            let err = settings.validate().unwrap_err();
            assert!(matches!(err, GatewayError::Config { .. }), "{settings:?}");
        }
    }
}
