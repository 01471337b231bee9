//! Notifier backed by the Telegram bot and SMTP

use async_trait::async_trait;

use vpnkeys_core::{CollaboratorError, CredentialBundle, Key, Notifier, Settings};

use crate::mail::SmtpMailer;
use crate::telegram::TelegramBot;

#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    bot: TelegramBot,
    mail: SmtpMailer,
}

impl ChannelNotifier {
    pub fn new(bot: TelegramBot, mail: SmtpMailer) -> Self {
        Self { bot, mail }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send_via_bot(
        &self,
        key: &Key,
        bundle: &CredentialBundle,
        settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        if !settings.bot_configured() {
            return Err(CollaboratorError::new("bot token or chat id not configured"));
        }
        let caption = format!(
            "{} (valid until {})",
            key.name,
            key.expires_at.format("%Y-%m-%d")
        );
        self.bot
            .send_document(&settings.bot_token, &settings.bot_chat_id, bundle, &caption)
            .await
    }

    async fn send_via_mail(
        &self,
        recipient: &str,
        bundle: &CredentialBundle,
        settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        self.mail.send_bundle(recipient, bundle, settings).await
    }

    async fn send_notice(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        self.mail.send_text(recipient, subject, body, settings).await
    }
}
