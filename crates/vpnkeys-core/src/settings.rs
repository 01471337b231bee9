//! Notification settings: a single persisted row read through explicit injection

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use vpnkeys_db::entities::settings::{self, SINGLETON_ID};

use crate::error::{Error, Result};

pub const DEFAULT_SUBJECT: &str = "Your VPN configuration";
pub const DEFAULT_TEXT: &str = "1 key - 1 device";

/// Per-event mail toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailNotify {
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

/// Partial update of [`MailNotify`]; `None` leaves a toggle as is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailNotifyPatch {
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

impl MailNotify {
    pub fn apply(&mut self, patch: &MailNotifyPatch) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = patch.$field { self.$field = value; })*
            };
        }
        merge!(
            mail_create_key,
            mail_delete_key,
            mail_expired_key,
            mail_block_key,
            mail_unblock_key,
            mail_day_before_expired,
            mail_week_before_expired,
            mail_update_key,
            mail_renew_key,
            mail_transfer_key,
            mail_traffic_limit
        );
    }
}

/// Decoded settings row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub bot_token: String,
    pub bot_chat_id: String,
    pub telegraph_token: Option<String>,
    pub use_mail: bool,
    pub mail_host: Option<String>,
    pub mail_port: Option<i32>,
    pub mail_login: Option<String>,
    pub mail_password: Option<String>,
    pub subject: String,
    pub text: String,
    pub mail_notify: MailNotify,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            bot_chat_id: String::new(),
            telegraph_token: None,
            use_mail: false,
            mail_host: None,
            mail_port: None,
            mail_login: None,
            mail_password: None,
            subject: DEFAULT_SUBJECT.to_string(),
            text: DEFAULT_TEXT.to_string(),
            mail_notify: MailNotify::default(),
        }
    }
}

impl Settings {
    fn from_model(model: settings::Model) -> Self {
        // A corrupt toggle blob degrades to "all off" rather than failing every read
        let mail_notify = serde_json::from_str(&model.mail_notify).unwrap_or_default();
        Self {
            bot_token: model.bot_token,
            bot_chat_id: model.bot_chat_id,
            telegraph_token: model.telegraph_token,
            use_mail: model.use_mail,
            mail_host: model.mail_host,
            mail_port: model.mail_port,
            mail_login: model.mail_login,
            mail_password: model.mail_password,
            subject: model.subject,
            text: model.text,
            mail_notify,
        }
    }

    fn to_active(&self) -> Result<settings::ActiveModel> {
        let mail_notify = serde_json::to_string(&self.mail_notify)
            .map_err(|e| Error::Validation(format!("mail_notify: {}", e)))?;
        Ok(settings::ActiveModel {
            id: Set(SINGLETON_ID),
            bot_token: Set(self.bot_token.clone()),
            bot_chat_id: Set(self.bot_chat_id.clone()),
            telegraph_token: Set(self.telegraph_token.clone()),
            use_mail: Set(self.use_mail),
            mail_host: Set(self.mail_host.clone()),
            mail_port: Set(self.mail_port),
            mail_login: Set(self.mail_login.clone()),
            mail_password: Set(self.mail_password.clone()),
            subject: Set(self.subject.clone()),
            text: Set(self.text.clone()),
            mail_notify: Set(mail_notify),
        })
    }

    /// Whether a bot delivery can be attempted at all
    pub fn bot_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.bot_chat_id.is_empty()
    }
}

/// Bot credential update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotUpdate {
    pub bot_token: Option<String>,
    pub bot_chat_id: Option<String>,
}

/// Mail transport update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailUpdate {
    pub use_mail: Option<bool>,
    pub mail_host: Option<String>,
    pub mail_port: Option<i32>,
    pub mail_login: Option<String>,
    pub mail_password: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
}

#[derive(Clone)]
pub struct SettingsStore {
    db: DatabaseConnection,
}

impl SettingsStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Current settings, inserting the default row on first access
    pub async fn get(&self) -> Result<Settings> {
        if let Some(model) = settings::Entity::find_by_id(SINGLETON_ID)
            .one(&self.db)
            .await?
        {
            return Ok(Settings::from_model(model));
        }

        Self::ensure_row(&self.db).await?;
        Self::read(&self.db).await
    }

    /// Insert the default row unless one exists. Concurrent first readers
    /// race on the primary key; the loser's insert is a no-op.
    async fn ensure_row<C: ConnectionTrait>(conn: &C) -> Result<()> {
        let inserted = settings::Entity::insert(Settings::default().to_active()?)
            .on_conflict(
                OnConflict::column(settings::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        if inserted > 0 {
            info!("Initialized default notification settings");
        }
        Ok(())
    }

    async fn read<C: ConnectionTrait>(conn: &C) -> Result<Settings> {
        settings::Entity::find_by_id(SINGLETON_ID)
            .one(conn)
            .await?
            .map(Settings::from_model)
            .ok_or_else(|| Error::DependencyUnavailable("settings row is missing".into()))
    }

    pub async fn update_bot(&self, update: BotUpdate) -> Result<Settings> {
        self.modify(|s| {
            if let Some(token) = update.bot_token {
                s.bot_token = token;
            }
            if let Some(chat_id) = update.bot_chat_id {
                s.bot_chat_id = chat_id;
            }
            Ok(())
        })
        .await
    }

    pub async fn update_mail(&self, update: MailUpdate) -> Result<Settings> {
        self.modify(|s| {
            if let Some(port) = update.mail_port {
                if !(1..=65535).contains(&port) {
                    return Err(Error::Validation(format!("mail_port {} out of range", port)));
                }
                s.mail_port = Some(port);
            }
            if let Some(use_mail) = update.use_mail {
                s.use_mail = use_mail;
            }
            if update.mail_host.is_some() {
                s.mail_host = update.mail_host;
            }
            if update.mail_login.is_some() {
                s.mail_login = update.mail_login;
            }
            if update.mail_password.is_some() {
                s.mail_password = update.mail_password;
            }
            if let Some(subject) = update.subject {
                s.subject = subject;
            }
            if let Some(text) = update.text {
                s.text = text;
            }
            Ok(())
        })
        .await
    }

    pub async fn update_mail_notify(&self, patch: MailNotifyPatch) -> Result<Settings> {
        self.modify(|s| {
            s.mail_notify.apply(&patch);
            Ok(())
        })
        .await
    }

    /// Read-modify-write of the single row inside one transaction
    async fn modify<F>(&self, f: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let txn = self.db.begin().await?;
        Self::ensure_row(&txn).await?;
        let mut current = Self::read(&txn).await?;

        f(&mut current)?;

        current.to_active()?.update(&txn).await?;
        txn.commit().await?;

        info!("Notification settings updated");
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SettingsStore {
        let db = vpnkeys_db::connect("sqlite::memory:").await.unwrap();
        vpnkeys_db::migrate(&db).await.unwrap();
        SettingsStore::new(db)
    }

    #[tokio::test]
    async fn test_get_creates_defaults_once() {
        let store = store().await;

        let first = store.get().await.unwrap();
        let second = store.get().await.unwrap();

        assert_eq!(first, Settings::default());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_default_insert_leaves_existing_row() {
        let store = store().await;
        store
            .update_bot(BotUpdate {
                bot_token: Some("123:abc".into()),
                bot_chat_id: None,
            })
            .await
            .unwrap();

        SettingsStore::ensure_row(&store.db).await.unwrap();

        assert_eq!(store.get().await.unwrap().bot_token, "123:abc");
    }

    #[tokio::test]
    async fn test_concurrent_first_reads_agree() {
        let store = store().await;

        let (a, b) = tokio::join!(store.get(), store.get());

        assert_eq!(a.unwrap(), Settings::default());
        assert_eq!(b.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_update_bot_keeps_unset_fields() {
        let store = store().await;
        store
            .update_bot(BotUpdate {
                bot_token: Some("123:abc".into()),
                bot_chat_id: Some("42".into()),
            })
            .await
            .unwrap();

        let updated = store
            .update_bot(BotUpdate {
                bot_token: None,
                bot_chat_id: Some("43".into()),
            })
            .await
            .unwrap();

        assert_eq!(updated.bot_token, "123:abc");
        assert_eq!(updated.bot_chat_id, "43");
        assert!(updated.bot_configured());
    }

    #[tokio::test]
    async fn test_update_mail_rejects_bad_port_without_writing() {
        let store = store().await;

        let err = store
            .update_mail(MailUpdate {
                use_mail: Some(true),
                mail_port: Some(70000),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(!store.get().await.unwrap().use_mail);
    }

    #[tokio::test]
    async fn test_mail_notify_patch_is_partial() {
        let store = store().await;
        store
            .update_mail_notify(MailNotifyPatch {
                mail_block_key: Some(true),
                mail_renew_key: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        let settings = store
            .update_mail_notify(MailNotifyPatch {
                mail_renew_key: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(settings.mail_notify.mail_block_key);
        assert!(!settings.mail_notify.mail_renew_key);
        assert_eq!(store.get().await.unwrap().mail_notify, settings.mail_notify);
    }
}
