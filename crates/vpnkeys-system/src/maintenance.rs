//! Backup, restore and uninstall through installation scripts

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use vpnkeys_core::{CollaboratorError, Maintenance};

use crate::command;

#[derive(Debug, Clone)]
pub struct ScriptMaintenance {
    shell: String,
    backup_script: PathBuf,
    /// Program and arguments that remove the installation
    uninstall_command: Vec<String>,
}

impl ScriptMaintenance {
    pub fn new(backup_script: impl Into<PathBuf>, uninstall_command: Vec<String>) -> Self {
        Self {
            shell: "bash".to_string(),
            backup_script: backup_script.into(),
            uninstall_command,
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    async fn backup_script(&self, args: &[&str]) -> Result<String, CollaboratorError> {
        let script = self.backup_script.to_string_lossy();
        let mut full: Vec<&str> = vec![&script];
        full.extend_from_slice(args);
        command::run(&self.shell, full).await
    }
}

#[async_trait]
impl Maintenance for ScriptMaintenance {
    async fn export_snapshot(&self) -> Result<String, CollaboratorError> {
        let output = self.backup_script(&["--backup"]).await?;
        info!("Backup created");
        Ok(output)
    }

    async fn import_snapshot(&self, location: &str) -> Result<String, CollaboratorError> {
        let output = self.backup_script(&["--restore", location]).await?;
        info!("Backup restored from {}", location);
        Ok(output)
    }

    async fn uninstall(&self) -> Result<String, CollaboratorError> {
        let (program, args) = self
            .uninstall_command
            .split_first()
            .ok_or_else(|| CollaboratorError::new("no uninstall command configured"))?;
        command::run(program, args).await
    }
}
