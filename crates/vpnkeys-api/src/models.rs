use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use vpnkeys_core::{
    BulkFailure, BulkSummary, Config, ConfigStats, GlobalStats, KeyCounts, KeyStats, KeyView,
    MailNotify, MailNotifyPatch, Session, Settings,
};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Outcome of an action endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionResult {
    /// Status word, e.g. "blocked"
    pub result: String,
    /// Captured output of the underlying command, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ActionResult {
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

// ============================================================================
// Key Models
// ============================================================================

/// Key listing query
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListKeysQuery {
    /// Criterion: all, name, email, status, port, config, protocol, days,
    /// created, updated, date, expired, expired_days, traffic, sessions,
    /// connected_time, free_keys
    pub by: Option<String>,
    /// Criterion value, e.g. a name, a port or a YYYY-MM-DD date
    pub value: Option<String>,
}

/// A key as rendered in listings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyOut {
    /// Position within the result set, starting at 1
    pub index: usize,
    pub id: i32,
    pub name: String,
    pub days: i32,
    pub email: Option<String>,
    pub config_id: i32,
    pub port: Option<i32>,
    pub protocol: Option<String>,
    pub address: Option<String>,
    /// `false` while blocked
    pub status: bool,
    pub connected: bool,
    pub expired: bool,
    pub days_left: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub total_bytes: i64,
    /// Traffic in human units
    pub traffic: String,
    pub sessions: u64,
    /// Seconds
    pub connected_time: i64,
}

impl From<KeyView> for KeyOut {
    fn from(view: KeyView) -> Self {
        Self {
            index: view.index,
            id: view.id,
            name: view.name,
            days: view.days,
            email: view.email,
            config_id: view.config_id,
            port: view.port,
            protocol: view.protocol.map(|p| p.as_str().to_string()),
            address: view.address,
            status: view.status,
            connected: view.connected,
            expired: view.expired,
            days_left: view.days_left,
            created: view.created,
            updated: view.updated,
            expiry: view.expiry,
            total_bytes: view.total_bytes,
            traffic: view.traffic,
            sessions: view.sessions,
            connected_time: view.connected_time,
        }
    }
}

/// Issue one or more keys
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateKeyRequest {
    pub name: String,
    pub days: i32,
    /// Number of sibling keys; more than one yields `name_1 .. name_N`
    #[serde(default = "default_amount")]
    pub amount: i32,
    pub config_id: i32,
    pub email: Option<String>,
}

fn default_amount() -> i32 {
    1
}

/// Partial key edit
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EditKeyRequest {
    pub days: Option<i32>,
    pub email: Option<String>,
}

/// Move a key to another config
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferKeyRequest {
    pub config_id: i32,
}

/// Ids for a bulk operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BulkRequest {
    pub ids: Vec<i32>,
    /// Recipient override, only used by `send_mail`
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkFailureOut {
    pub id: i32,
    pub code: String,
    pub error: String,
}

impl From<BulkFailure> for BulkFailureOut {
    fn from(failure: BulkFailure) -> Self {
        Self {
            id: failure.id,
            code: failure.code.to_string(),
            error: failure.error,
        }
    }
}

/// Bulk operation summary; always returned with 200
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkResponse {
    /// Result label, e.g. "blocked_bulk"
    pub result: String,
    pub operation: String,
    pub requested: usize,
    /// Items applied or already in the target state
    pub processed: usize,
    pub applied: usize,
    pub unchanged: usize,
    /// Unknown or invalid ids
    pub skipped: Vec<i32>,
    pub failed: Vec<BulkFailureOut>,
}

impl From<BulkSummary> for BulkResponse {
    fn from(summary: BulkSummary) -> Self {
        Self {
            result: summary.operation.result_label().to_string(),
            operation: summary.operation.as_str().to_string(),
            requested: summary.requested,
            processed: summary.processed(),
            applied: summary.applied,
            unchanged: summary.unchanged,
            skipped: summary.skipped,
            failed: summary.failed.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Config Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigOut {
    pub id: i32,
    pub port: i32,
    pub protocol: String,
    pub telnet_port: i32,
    pub address: String,
    pub subnet: String,
    /// Whether the instance is enabled
    pub status: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Config> for ConfigOut {
    fn from(config: Config) -> Self {
        Self {
            id: config.id,
            port: config.port,
            protocol: config.protocol.as_str().to_string(),
            telnet_port: config.telnet_port,
            address: config.address,
            subnet: config.subnet,
            status: config.status,
            created: config.created,
            updated: config.updated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateConfigRequest {
    pub port: i32,
    /// "udp" or "tcp"
    pub protocol: String,
    pub address: String,
    /// CIDR, e.g. "10.8.0.0/24"
    pub subnet: String,
    /// Management port, 9999 when omitted
    pub telnet_port: Option<i32>,
}

// ============================================================================
// Session Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionOut {
    pub id: i32,
    pub key_id: i32,
    pub ip: String,
    pub connected: DateTime<Utc>,
    pub disconnected: Option<DateTime<Utc>>,
    pub total_bytes: i64,
    /// Seconds
    pub total_connected_time: i64,
}

impl From<Session> for SessionOut {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            key_id: session.key_id,
            ip: session.ip,
            connected: session.connected,
            disconnected: session.disconnected,
            total_bytes: session.total_bytes,
            total_connected_time: session.total_connected_time,
        }
    }
}

/// A client connected
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectRequest {
    pub key_id: i32,
    pub ip: String,
    /// Defaults to the time of the request
    pub at: Option<DateTime<Utc>>,
}

/// Live byte counter of an open session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrafficRequest {
    pub total_bytes: i64,
    pub at: Option<DateTime<Utc>>,
}

/// A client disconnected
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisconnectRequest {
    pub total_bytes: i64,
    pub at: Option<DateTime<Utc>>,
}

// ============================================================================
// Statistics Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyCountsOut {
    pub total: u64,
    pub active: u64,
    pub blocked: u64,
    pub connected: u64,
    pub expired: u64,
    pub not_expired: u64,
}

impl From<KeyCounts> for KeyCountsOut {
    fn from(counts: KeyCounts) -> Self {
        Self {
            total: counts.total,
            active: counts.active,
            blocked: counts.blocked,
            connected: counts.connected,
            expired: counts.expired,
            not_expired: counts.not_expired,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigStatisticsOut {
    pub id: i32,
    pub port: i32,
    pub protocol: String,
    pub address: String,
    pub keys: KeyCountsOut,
    pub total_bytes: i64,
    pub traffic: String,
}

impl From<ConfigStats> for ConfigStatisticsOut {
    fn from(stats: ConfigStats) -> Self {
        Self {
            id: stats.id,
            port: stats.port,
            protocol: stats.protocol.as_str().to_string(),
            address: stats.address,
            keys: stats.keys.into(),
            total_bytes: stats.total_bytes,
            traffic: stats.traffic,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatisticsResponse {
    pub keys: KeyCountsOut,
    pub total_configs: u64,
    pub total_bytes: i64,
    pub total_traffic: String,
    pub configs: Vec<ConfigStatisticsOut>,
}

impl From<GlobalStats> for StatisticsResponse {
    fn from(stats: GlobalStats) -> Self {
        Self {
            keys: stats.keys.into(),
            total_configs: stats.total_configs,
            total_bytes: stats.total_bytes,
            total_traffic: stats.total_traffic,
            configs: stats.configs.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyStatisticsResponse {
    pub id: i32,
    pub name: String,
    pub config_id: i32,
    pub status: bool,
    pub connected: bool,
    pub expired: bool,
    pub sessions: u64,
    pub total_bytes: i64,
    pub traffic: String,
    /// Seconds
    pub total_connected_time: i64,
}

impl From<KeyStats> for KeyStatisticsResponse {
    fn from(stats: KeyStats) -> Self {
        Self {
            id: stats.id,
            name: stats.name,
            config_id: stats.config_id,
            status: stats.status,
            connected: stats.connected,
            expired: stats.expired,
            sessions: stats.sessions,
            total_bytes: stats.total_bytes,
            traffic: stats.traffic,
            total_connected_time: stats.total_connected_time,
        }
    }
}

// ============================================================================
// Settings Models
// ============================================================================

/// Per-event mail toggles
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MailNotifyOut {
    pub mail_create_key: bool,
    pub mail_delete_key: bool,
    pub mail_expired_key: bool,
    pub mail_block_key: bool,
    pub mail_unblock_key: bool,
    pub mail_day_before_expired: bool,
    pub mail_week_before_expired: bool,
    pub mail_update_key: bool,
    pub mail_renew_key: bool,
    pub mail_transfer_key: bool,
    pub mail_traffic_limit: bool,
}

impl From<MailNotify> for MailNotifyOut {
    fn from(n: MailNotify) -> Self {
        Self {
            mail_create_key: n.mail_create_key,
            mail_delete_key: n.mail_delete_key,
            mail_expired_key: n.mail_expired_key,
            mail_block_key: n.mail_block_key,
            mail_unblock_key: n.mail_unblock_key,
            mail_day_before_expired: n.mail_day_before_expired,
            mail_week_before_expired: n.mail_week_before_expired,
            mail_update_key: n.mail_update_key,
            mail_renew_key: n.mail_renew_key,
            mail_transfer_key: n.mail_transfer_key,
            mail_traffic_limit: n.mail_traffic_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettingsResponse {
    pub bot_token: String,
    pub bot_chat_id: String,
    pub use_mail: bool,
    pub mail_host: Option<String>,
    pub mail_port: Option<i32>,
    pub mail_login: Option<String>,
    pub mail_password: Option<String>,
    pub subject: String,
    pub text: String,
    pub mail_notify: MailNotifyOut,
}

impl From<Settings> for SettingsResponse {
    fn from(s: Settings) -> Self {
        Self {
            bot_token: s.bot_token,
            bot_chat_id: s.bot_chat_id,
            use_mail: s.use_mail,
            mail_host: s.mail_host,
            mail_port: s.mail_port,
            mail_login: s.mail_login,
            mail_password: s.mail_password,
            subject: s.subject,
            text: s.text,
            mail_notify: s.mail_notify.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BotSettingsRequest {
    pub bot_token: Option<String>,
    pub bot_chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MailSettingsRequest {
    pub use_mail: Option<bool>,
    pub mail_host: Option<String>,
    pub mail_port: Option<i32>,
    pub mail_login: Option<String>,
    pub mail_password: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
}

/// Partial toggle update; omitted toggles keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MailNotifyRequest {
    pub mail_create_key: Option<bool>,
    pub mail_delete_key: Option<bool>,
    pub mail_expired_key: Option<bool>,
    pub mail_block_key: Option<bool>,
    pub mail_unblock_key: Option<bool>,
    pub mail_day_before_expired: Option<bool>,
    pub mail_week_before_expired: Option<bool>,
    pub mail_update_key: Option<bool>,
    pub mail_renew_key: Option<bool>,
    pub mail_transfer_key: Option<bool>,
    pub mail_traffic_limit: Option<bool>,
}

impl From<MailNotifyRequest> for MailNotifyPatch {
    fn from(r: MailNotifyRequest) -> Self {
        Self {
            mail_create_key: r.mail_create_key,
            mail_delete_key: r.mail_delete_key,
            mail_expired_key: r.mail_expired_key,
            mail_block_key: r.mail_block_key,
            mail_unblock_key: r.mail_unblock_key,
            mail_day_before_expired: r.mail_day_before_expired,
            mail_week_before_expired: r.mail_week_before_expired,
            mail_update_key: r.mail_update_key,
            mail_renew_key: r.mail_renew_key,
            mail_transfer_key: r.mail_transfer_key,
            mail_traffic_limit: r.mail_traffic_limit,
        }
    }
}

// ============================================================================
// System Models
// ============================================================================

/// Restore a backup from a download link
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImportDbRequest {
    pub link: String,
}
