//! External collaborator seams
//!
//! The engine never shells out, talks SMTP or touches certificate files itself.
//! Service control, credential provisioning, notification delivery and
//! backup/restore are consumed through the traits below; `vpnkeys-system`
//! provides the production implementations.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::settings::Settings;
use crate::{Config, Key};

/// Failure reported by a collaborator, carrying its captured output
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A client credential file as produced by provisioning
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialBundle {
    /// File name presented to the recipient, e.g. `alice.ovpn`
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// Start/stop/restart of named OS service units
///
/// Calls are synchronous from the caller's point of view and may be slow.
/// `Ok` carries the captured output of the service manager.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn start(&self, unit: &str) -> Result<String, CollaboratorError>;

    async fn stop(&self, unit: &str) -> Result<String, CollaboratorError>;

    async fn restart(&self, unit: &str) -> Result<String, CollaboratorError>;
}

/// Credential material lifecycle for keys
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create credential material for a freshly issued key
    async fn issue(&self, key: &Key, config: &Config) -> Result<CredentialBundle, CollaboratorError>;

    /// Invalidate the key's credential material
    async fn revoke(&self, key: &Key) -> Result<(), CollaboratorError>;

    /// Replace the key's credential material, invalidating the previous bundle
    async fn reissue(
        &self,
        key: &Key,
        config: &Config,
    ) -> Result<CredentialBundle, CollaboratorError>;

    /// Current credential bundle of the key, for delivery
    async fn bundle(&self, key: &Key, config: &Config) -> Result<CredentialBundle, CollaboratorError>;
}

/// Outbound delivery through the messaging bot and mail
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the key's bundle to the configured bot chat
    async fn send_via_bot(
        &self,
        key: &Key,
        bundle: &CredentialBundle,
        settings: &Settings,
    ) -> Result<(), CollaboratorError>;

    /// Mail the key's bundle to `recipient` using the settings' subject/text
    async fn send_via_mail(
        &self,
        recipient: &str,
        bundle: &CredentialBundle,
        settings: &Settings,
    ) -> Result<(), CollaboratorError>;

    /// Plain lifecycle notice mail, no attachment
    async fn send_notice(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        settings: &Settings,
    ) -> Result<(), CollaboratorError>;
}

/// Database snapshot and installation management
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Produce a backup; returns the tool's output (usually a download link)
    async fn export_snapshot(&self) -> Result<String, CollaboratorError>;

    /// Restore from a backup location
    async fn import_snapshot(&self, location: &str) -> Result<String, CollaboratorError>;

    /// Remove the VPN installation from the host
    async fn uninstall(&self) -> Result<String, CollaboratorError>;
}

/// Run a collaborator call with a deadline, folding timeouts into the error
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError(format!(
            "timed out after {}s",
            limit.as_secs()
        ))),
    }
}
