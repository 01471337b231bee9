//! Credential provisioning through the installation's management script
//!
//! The script is invoked as `<shell> <script> --create <name> <port> <protocol>`
//! and `<shell> <script> --revoke <name>`, and leaves client bundles as
//! `<clients_dir>/<name>.ovpn`.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

use vpnkeys_core::{CollaboratorError, Config, CredentialBundle, Key, Provisioner};

use crate::command;

const BUNDLE_EXTENSION: &str = "ovpn";

#[derive(Debug, Clone)]
pub struct ScriptProvisioner {
    shell: String,
    script: PathBuf,
    clients_dir: PathBuf,
}

impl ScriptProvisioner {
    pub fn new(script: impl Into<PathBuf>, clients_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: "bash".to_string(),
            script: script.into(),
            clients_dir: clients_dir.into(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    fn bundle_path(&self, key: &Key) -> Result<PathBuf, CollaboratorError> {
        let name = key.name.as_str();
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(CollaboratorError(format!(
                "key name '{}' cannot be used as a file name",
                name
            )));
        }
        Ok(self
            .clients_dir
            .join(format!("{}.{}", name, BUNDLE_EXTENSION)))
    }

    async fn script(&self, args: &[&str]) -> Result<String, CollaboratorError> {
        let script = self.script.to_string_lossy();
        let mut full: Vec<&str> = Vec::with_capacity(args.len() + 1);
        full.push(&script);
        full.extend_from_slice(args);
        command::run(&self.shell, full).await
    }

    async fn read_bundle(&self, key: &Key) -> Result<CredentialBundle, CollaboratorError> {
        let path = self.bundle_path(key)?;
        let contents = tokio::fs::read(&path)
            .await
            .map_err(|e| CollaboratorError(format!("reading {}: {}", path.display(), e)))?;
        Ok(CredentialBundle {
            file_name: format!("{}.{}", key.name, BUNDLE_EXTENSION),
            contents,
        })
    }
}

#[async_trait]
impl Provisioner for ScriptProvisioner {
    async fn issue(&self, key: &Key, config: &Config) -> Result<CredentialBundle, CollaboratorError> {
        self.bundle_path(key)?;
        let port = config.port.to_string();
        self.script(&["--create", &key.name, &port, config.protocol.as_str()])
            .await?;
        info!("Credential issued for key {}", key.name);
        self.read_bundle(key).await
    }

    async fn revoke(&self, key: &Key) -> Result<(), CollaboratorError> {
        let path = self.bundle_path(key)?;
        self.script(&["--revoke", &key.name]).await?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CollaboratorError(format!(
                    "removing {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        info!("Credential revoked for key {}", key.name);
        Ok(())
    }

    async fn reissue(
        &self,
        key: &Key,
        config: &Config,
    ) -> Result<CredentialBundle, CollaboratorError> {
        self.revoke(key).await?;
        self.issue(key, config).await
    }

    async fn bundle(&self, key: &Key, _config: &Config) -> Result<CredentialBundle, CollaboratorError> {
        self.read_bundle(key).await
    }
}
