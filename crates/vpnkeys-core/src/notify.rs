//! Delivery of a key's credential bundle through the bot or mail

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::collaborators::{with_timeout, Notifier, Provisioner};
use crate::error::{Error, Result};
use crate::keys::KeyStore;
use crate::settings::SettingsStore;

#[derive(Clone)]
pub struct KeyNotifier {
    keys: KeyStore,
    settings: SettingsStore,
    provisioner: Arc<dyn Provisioner>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl KeyNotifier {
    pub fn new(
        keys: KeyStore,
        settings: SettingsStore,
        provisioner: Arc<dyn Provisioner>,
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            keys,
            settings,
            provisioner,
            notifier,
            timeout,
        }
    }

    /// Send the key's bundle to the configured bot chat
    pub async fn send_via_bot(&self, key_id: i32) -> Result<()> {
        let (key, config) = self.keys.get_with_config(key_id).await?;
        let settings = self.settings.get().await?;
        if !settings.bot_configured() {
            return Err(Error::Notification("bot token or chat id not configured".into()));
        }

        let bundle = with_timeout(self.timeout, self.provisioner.bundle(&key, &config))
            .await
            .map_err(|e| Error::Provisioning(e.0))?;
        with_timeout(
            self.timeout,
            self.notifier.send_via_bot(&key, &bundle, &settings),
        )
        .await
        .map_err(|e| Error::Notification(e.0))?;

        info!("Key {} sent to bot chat", key_id);
        Ok(())
    }

    /// Mail the key's bundle to `recipient`, or to the key's own address
    pub async fn send_via_mail(&self, key_id: i32, recipient: Option<&str>) -> Result<()> {
        let (key, config) = self.keys.get_with_config(key_id).await?;
        let recipient = recipient
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or(key.email.as_deref())
            .ok_or_else(|| Error::Validation(format!("key {} has no email address", key_id)))?
            .to_string();

        let settings = self.settings.get().await?;
        if !settings.use_mail {
            return Err(Error::Notification("mail delivery is disabled".into()));
        }

        let bundle = with_timeout(self.timeout, self.provisioner.bundle(&key, &config))
            .await
            .map_err(|e| Error::Provisioning(e.0))?;
        with_timeout(
            self.timeout,
            self.notifier.send_via_mail(&recipient, &bundle, &settings),
        )
        .await
        .map_err(|e| Error::Notification(e.0))?;

        info!("Key {} mailed to {}", key_id, recipient);
        Ok(())
    }
}
