//! SMTP delivery built per call from the persisted mail settings

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

use vpnkeys_core::{CollaboratorError, CredentialBundle, Settings};

/// Port on which the server expects TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;
const BUNDLE_CONTENT_TYPE: &str = "application/x-openvpn-profile";

fn mail_err(context: &str, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError(format!("{}: {}", context, e))
}

/// SMTP parameters extracted from settings
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpParams {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

impl SmtpParams {
    pub fn from_settings(settings: &Settings) -> Result<Self, CollaboratorError> {
        let missing = |field: &str| CollaboratorError(format!("mail setting {} is not set", field));
        let host = settings
            .mail_host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| missing("mail_host"))?;
        let port = settings.mail_port.ok_or_else(|| missing("mail_port"))?;
        let port = u16::try_from(port)
            .map_err(|_| CollaboratorError(format!("mail_port {} out of range", port)))?;
        let login = settings
            .mail_login
            .clone()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| missing("mail_login"))?;
        let password = settings.mail_password.clone().unwrap_or_default();

        Ok(Self {
            host,
            port,
            login,
            password,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Mail a credential bundle using the settings' subject and text
    pub async fn send_bundle(
        &self,
        recipient: &str,
        bundle: &CredentialBundle,
        settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        let params = SmtpParams::from_settings(settings)?;
        let content_type =
            ContentType::parse(BUNDLE_CONTENT_TYPE).map_err(|e| mail_err("content type", e))?;
        let body = MultiPart::mixed()
            .singlepart(SinglePart::plain(settings.text.clone()))
            .singlepart(Attachment::new(bundle.file_name.clone()).body(bundle.contents.clone(), content_type));

        let message = Self::envelope(&params, recipient, &settings.subject)?
            .multipart(body)
            .map_err(|e| mail_err("building message", e))?;
        self.deliver(&params, message).await?;
        debug!("Mailed {} to {}", bundle.file_name, recipient);
        Ok(())
    }

    /// Plain text mail without attachment
    pub async fn send_text(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        let params = SmtpParams::from_settings(settings)?;
        let message = Self::envelope(&params, recipient, subject)?
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| mail_err("building message", e))?;
        self.deliver(&params, message).await?;
        debug!("Mailed notice '{}' to {}", subject, recipient);
        Ok(())
    }

    fn envelope(
        params: &SmtpParams,
        recipient: &str,
        subject: &str,
    ) -> Result<lettre::message::MessageBuilder, CollaboratorError> {
        let from: Mailbox = params
            .login
            .parse()
            .map_err(|e| mail_err("sender address", e))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| mail_err("recipient address", e))?;
        Ok(Message::builder().from(from).to(to).subject(subject))
    }

    async fn deliver(&self, params: &SmtpParams, message: Message) -> Result<(), CollaboratorError> {
        let builder = if params.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&params.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&params.host)
        }
        .map_err(|e| mail_err("SMTP relay", e))?;

        let transport = builder
            .port(params.port)
            .credentials(Credentials::new(
                params.login.clone(),
                params.password.clone(),
            ))
            .timeout(Some(self.timeout))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| mail_err("SMTP delivery", e))?;
        Ok(())
    }
}
