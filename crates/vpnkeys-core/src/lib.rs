//! Key/session lifecycle and statistics engine for VPN access keys
pub mod bulk;
pub mod collaborators;
pub mod configs;
pub mod error;
pub mod events;
pub mod format;
pub mod keys;
pub mod notify;
pub mod query;
pub mod sessions;
pub mod settings;
pub mod stats;
pub mod system;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use vpnkeys_db::entities::{access_key, session, vpn_config};

pub use bulk::{BulkCoordinator, BulkFailure, BulkOperation, BulkSummary};
pub use collaborators::{
    CollaboratorError, CredentialBundle, Maintenance, Notifier, Provisioner, ServiceControl,
};
pub use configs::{ConfigRegistry, NewConfig, UnitNaming, DEFAULT_TELNET_PORT};
pub use error::{Error, Result};
pub use events::{EventMailer, KeyEvent};
pub use format::format_bytes;
pub use keys::{IssueRequest, KeyEdit, KeyStore, Transition};
pub use notify::KeyNotifier;
pub use query::{Criterion, KeyQuery, KeyView};
pub use sessions::{KeyUsage, Scope, SessionLedger};
pub use settings::{BotUpdate, MailNotify, MailNotifyPatch, MailUpdate, Settings, SettingsStore};
pub use stats::{ConfigStats, GlobalStats, KeyCounts, KeyStats, StatsAggregator};
pub use system::{BotAction, SystemOps};
pub use vpn_config::Protocol;

pub type Key = access_key::Model;
pub type Config = vpn_config::Model;
pub type Session = session::Model;

/// Production implementations of the collaborator seams
#[derive(Clone)]
pub struct Collaborators {
    pub service: Arc<dyn ServiceControl>,
    pub provisioner: Arc<dyn Provisioner>,
    pub notifier: Arc<dyn Notifier>,
    pub maintenance: Arc<dyn Maintenance>,
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub unit_naming: UnitNaming,
    pub bot_unit: String,
    /// Deadline for service control, provisioning and maintenance calls
    pub service_timeout: Duration,
    /// Deadline for bot and mail delivery
    pub notify_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            unit_naming: UnitNaming::default(),
            bot_unit: "openvpn-bot".to_string(),
            service_timeout: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(20),
        }
    }
}

/// All engine components wired against one store
#[derive(Clone)]
pub struct VpnKeys {
    pub configs: ConfigRegistry,
    pub keys: KeyStore,
    pub sessions: SessionLedger,
    pub query: KeyQuery,
    pub stats: StatsAggregator,
    pub bulk: BulkCoordinator,
    pub notify: KeyNotifier,
    pub settings: SettingsStore,
    pub system: SystemOps,
}

impl VpnKeys {
    pub fn new(db: DatabaseConnection, collaborators: Collaborators, options: EngineOptions) -> Self {
        let settings = SettingsStore::new(db.clone());
        let sessions = SessionLedger::new(db.clone());
        let events = EventMailer::new(
            settings.clone(),
            collaborators.notifier.clone(),
            options.notify_timeout,
        );

        let configs = ConfigRegistry::new(
            db.clone(),
            collaborators.service.clone(),
            options.unit_naming,
            options.service_timeout,
        );
        let keys = KeyStore::new(
            db.clone(),
            collaborators.provisioner.clone(),
            events,
            options.service_timeout,
        );
        let notify = KeyNotifier::new(
            keys.clone(),
            settings.clone(),
            collaborators.provisioner,
            collaborators.notifier,
            options.notify_timeout,
        );
        let query = KeyQuery::new(db.clone(), sessions.clone());
        let stats = StatsAggregator::new(db, sessions.clone());
        let bulk = BulkCoordinator::new(keys.clone(), sessions.clone(), notify.clone());
        let system = SystemOps::new(
            collaborators.maintenance,
            collaborators.service,
            sessions.clone(),
            options.bot_unit,
            options.service_timeout,
        );

        Self {
            configs,
            keys,
            sessions,
            query,
            stats,
            bulk,
            notify,
            settings,
            system,
        }
    }
}
