//! Best-effort lifecycle mails, sent after a key mutation has committed

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::collaborators::{with_timeout, Notifier};
use crate::settings::{MailNotify, SettingsStore};
use crate::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Created,
    Deleted,
    Blocked,
    Unblocked,
    Updated,
    Renewed,
    Transferred,
}

impl KeyEvent {
    fn enabled(&self, toggles: &MailNotify) -> bool {
        match self {
            KeyEvent::Created => toggles.mail_create_key,
            KeyEvent::Deleted => toggles.mail_delete_key,
            KeyEvent::Blocked => toggles.mail_block_key,
            KeyEvent::Unblocked => toggles.mail_unblock_key,
            KeyEvent::Updated => toggles.mail_update_key,
            KeyEvent::Renewed => toggles.mail_renew_key,
            KeyEvent::Transferred => toggles.mail_transfer_key,
        }
    }

    fn describe(&self, key: &Key) -> (String, String) {
        let expiry = key.expires_at.format("%Y-%m-%d %H:%M UTC");
        match self {
            KeyEvent::Created => (
                format!("VPN key {} created", key.name),
                format!("Your VPN key {} is valid until {}.", key.name, expiry),
            ),
            KeyEvent::Deleted => (
                format!("VPN key {} deleted", key.name),
                format!("Your VPN key {} has been deleted.", key.name),
            ),
            KeyEvent::Blocked => (
                format!("VPN key {} blocked", key.name),
                format!("Your VPN key {} has been blocked.", key.name),
            ),
            KeyEvent::Unblocked => (
                format!("VPN key {} unblocked", key.name),
                format!("Your VPN key {} is active again.", key.name),
            ),
            KeyEvent::Updated => (
                format!("VPN key {} updated", key.name),
                format!(
                    "Your VPN key {} now runs for {} days, until {}.",
                    key.name, key.days, expiry
                ),
            ),
            KeyEvent::Renewed => (
                format!("VPN key {} renewed", key.name),
                format!("Your VPN key {} has been renewed until {}.", key.name, expiry),
            ),
            KeyEvent::Transferred => (
                format!("VPN key {} moved", key.name),
                format!(
                    "Your VPN key {} has been moved to another server. Please download the new configuration.",
                    key.name
                ),
            ),
        }
    }
}

#[derive(Clone)]
pub struct EventMailer {
    settings: SettingsStore,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl EventMailer {
    pub fn new(settings: SettingsStore, notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            settings,
            notifier,
            timeout,
        }
    }

    /// Mail the key's owner if mail is on, the event is toggled on and the
    /// key has an address. Never fails: problems are logged.
    pub async fn dispatch(&self, event: KeyEvent, key: &Key) {
        let Some(recipient) = key.email.as_deref().filter(|e| !e.is_empty()) else {
            return;
        };

        let settings = match self.settings.get().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Skipping {:?} mail for key {}: {}", event, key.id, e);
                return;
            }
        };
        if !settings.use_mail || !event.enabled(&settings.mail_notify) {
            return;
        }

        let (subject, body) = event.describe(key);
        let send = self
            .notifier
            .send_notice(recipient, &subject, &body, &settings);
        match with_timeout(self.timeout, send).await {
            Ok(()) => debug!("{:?} mail sent for key {}", event, key.id),
            Err(e) => warn!("{:?} mail for key {} failed: {}", event, key.id, e),
        }
    }
}
