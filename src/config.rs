use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mesh::{MeshConfig, MeshError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub mesh: MeshConfig,
}

/// Every node binds and broadcasts on the same port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub broadcast_addr: IpAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 47474,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            mesh: MeshConfig::default(),
        }
    }
}

impl Config {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            MeshError::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })?;
        config.mesh.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, MeshError> {
        serde_json::to_string_pretty(self).map_err(|e| MeshError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn network_config_default_uses_broadcast() {
        let cfg = NetworkConfig::default();
        assert_eq!(cfg.broadcast_addr, IpAddr::V4(Ipv4Addr::BROADCAST));
        assert_eq!(cfg.port, 47474);
    }

    #[test]
    fn load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{ "network": {{ "port": 5000 }}, "mesh": {{ "brightness": 64 }} }}"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).expect("load");
        assert_eq!(cfg.network.port, 5000);
        assert_eq!(cfg.network.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cfg.mesh.brightness, 64);
        assert_eq!(cfg.mesh.total_pixels, 300);
    }

    #[test]
    fn load_rejects_invalid_mesh() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{ "mesh": {{ "chunk_capacity": 1 }} }}"#).unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(MeshError::TooManyChunks { .. })
        ));
    }

    #[test]
    fn load_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "not json").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(MeshError::InvalidConfig(_))
        ));
    }

    #[test]
    fn json_round_trips_through_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mesh.json");
        std::fs::write(&path, Config::default().to_json().unwrap()).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }
}
