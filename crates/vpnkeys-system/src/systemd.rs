//! systemd-backed service control

use async_trait::async_trait;
use tracing::info;

use vpnkeys_core::{CollaboratorError, ServiceControl};

use crate::command;

/// Drives units through `systemctl`
#[derive(Debug, Clone)]
pub struct SystemdServiceControl {
    systemctl: String,
    user: bool,
}

impl SystemdServiceControl {
    pub fn new() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
            user: false,
        }
    }

    /// Use another `systemctl` binary
    pub fn with_binary(mut self, systemctl: impl Into<String>) -> Self {
        self.systemctl = systemctl.into();
        self
    }

    /// Manage the calling user's units (`systemctl --user`)
    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    async fn systemctl(&self, verb: &str, unit: &str) -> Result<String, CollaboratorError> {
        let mut args = Vec::with_capacity(3);
        if self.user {
            args.push("--user");
        }
        args.push(verb);
        args.push(unit);

        let output = command::run(&self.systemctl, args).await?;
        info!("systemctl {} {} succeeded", verb, unit);
        Ok(output)
    }
}

impl Default for SystemdServiceControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceControl for SystemdServiceControl {
    async fn start(&self, unit: &str) -> Result<String, CollaboratorError> {
        self.systemctl("start", unit).await
    }

    async fn stop(&self, unit: &str) -> Result<String, CollaboratorError> {
        self.systemctl("stop", unit).await
    }

    async fn restart(&self, unit: &str) -> Result<String, CollaboratorError> {
        self.systemctl("restart", unit).await
    }
}
