//! Service configuration
//!
//! Read from `--config <path>` or ~/.vpnkeys/config.json. Missing files and
//! missing fields fall back to defaults; CLI flags override single fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vpnkeys_core::{EngineOptions, UnitNaming};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub enable_cors: bool,
    /// Service unit of a config; `{port}` and `{id}` are substituted
    pub unit_template: String,
    pub bot_unit: String,
    /// Management script that creates and revokes client credentials
    pub provision_script: PathBuf,
    /// Where the management script leaves `<name>.ovpn` bundles
    pub clients_dir: PathBuf,
    pub backup_script: PathBuf,
    /// Program and arguments that remove the installation
    pub uninstall_command: Vec<String>,
    pub service_timeout_secs: u64,
    pub notify_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./vpnkeys.db?mode=rwc".to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
            enable_cors: true,
            unit_template: "openvpn-server@{port}".to_string(),
            bot_unit: "openvpn-bot".to_string(),
            provision_script: PathBuf::from("/etc/openvpn/openvpn.sh"),
            clients_dir: PathBuf::from("/etc/openvpn/clients"),
            backup_script: PathBuf::from("/etc/openvpn/openvpn.sh"),
            uninstall_command: vec!["python3".into(), "install.py".into(), "-u".into()],
            service_timeout_secs: 30,
            notify_timeout_secs: 20,
        }
    }
}

impl AppConfig {
    pub fn bind_socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_addr))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            unit_naming: UnitNaming::new(self.unit_template.clone()),
            bot_unit: self.bot_unit.clone(),
            service_timeout: Duration::from_secs(self.service_timeout_secs),
            notify_timeout: Duration::from_secs(self.notify_timeout_secs),
        }
    }
}

/// Configuration file manager
pub struct ConfigManager;

impl ConfigManager {
    /// ~/.vpnkeys/config.json
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".vpnkeys").join("config.json"))
    }

    /// Load from `path`, or the default location when `None`
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::default_path()?),
        }
    }

    pub fn load_from(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }

        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn save_to(path: &Path, config: &AppConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let config = ConfigManager::load_from(&dir.path().join("absent.json")).unwrap();

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "database_url": "postgres://vpn@localhost/vpnkeys", "service_timeout_secs": 5 }"#,
        )
        .unwrap();

        let config = ConfigManager::load_from(&path).unwrap();

        assert_eq!(config.database_url, "postgres://vpn@localhost/vpnkeys");
        assert_eq!(config.service_timeout_secs, 5);
        assert_eq!(config.bot_unit, "openvpn-bot");
        assert_eq!(
            config.engine_options().service_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            bind_addr: "0.0.0.0:9000".to_string(),
            ..AppConfig::default()
        };

        ConfigManager::save_to(&path, &config).unwrap();

        assert_eq!(ConfigManager::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigManager::load_from(&path).unwrap_err();

        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_bind_addr_validation() {
        let mut config = AppConfig::default();
        assert_eq!(config.bind_socket_addr().unwrap().port(), 8080);

        config.bind_addr = "localhost".to_string();
        assert!(config.bind_socket_addr().is_err());
    }
}
