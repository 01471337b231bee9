//! Installation-level operations: backups, uninstall, statistics reset and
//! the notification bot's service unit

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::collaborators::{with_timeout, Maintenance, ServiceControl};
use crate::error::{Error, Result};
use crate::sessions::SessionLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotAction {
    Enable,
    Disable,
    Restart,
}

#[derive(Clone)]
pub struct SystemOps {
    maintenance: Arc<dyn Maintenance>,
    service: Arc<dyn ServiceControl>,
    ledger: SessionLedger,
    bot_unit: String,
    timeout: Duration,
}

impl SystemOps {
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        service: Arc<dyn ServiceControl>,
        ledger: SessionLedger,
        bot_unit: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            maintenance,
            service,
            ledger,
            bot_unit: bot_unit.into(),
            timeout,
        }
    }

    /// Produce a backup, returning the tool's output
    pub async fn export_db(&self) -> Result<String> {
        let output = with_timeout(self.timeout, self.maintenance.export_snapshot())
            .await
            .map_err(|e| Error::ServiceControl {
                unit: "backup".into(),
                output: e.0,
            })?;
        info!("Database exported");
        Ok(output)
    }

    pub async fn import_db(&self, link: &str) -> Result<String> {
        let link = link.trim();
        if link.is_empty() {
            return Err(Error::Validation("backup link must not be empty".into()));
        }

        let output = with_timeout(self.timeout, self.maintenance.import_snapshot(link))
            .await
            .map_err(|e| Error::ServiceControl {
                unit: "restore".into(),
                output: e.0,
            })?;
        info!("Database imported from {}", link);
        Ok(output)
    }

    /// Remove the VPN installation from the host
    pub async fn delete_installation(&self) -> Result<String> {
        warn!("Uninstalling the VPN installation");
        with_timeout(self.timeout, self.maintenance.uninstall())
            .await
            .map_err(|e| Error::ServiceControl {
                unit: "uninstall".into(),
                output: e.0,
            })
    }

    /// Drop every session and reset all keys to disconnected
    pub async fn clear_statistics(&self) -> Result<u64> {
        self.ledger.clear_all().await
    }

    pub async fn control_bot(&self, action: BotAction) -> Result<String> {
        let unit = self.bot_unit.as_str();
        let call = async {
            match action {
                BotAction::Enable => self.service.start(unit).await,
                BotAction::Disable => self.service.stop(unit).await,
                BotAction::Restart => self.service.restart(unit).await,
            }
        };
        let output = with_timeout(self.timeout, call)
            .await
            .map_err(|e| Error::ServiceControl {
                unit: unit.to_string(),
                output: e.0,
            })?;
        info!("Bot unit {} {:?} acknowledged", unit, action);
        Ok(output)
    }
}
