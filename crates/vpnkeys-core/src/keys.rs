//! Key store: issuance and the key lifecycle state machine
//!
//! Stored state is `status` (active/blocked) plus the orthogonal `connected`
//! flag. Expiry is derived at read time from the stored `expires_at`:
//! a key is expired when `now > expires_at`.
//!
//! Every single-key mutation is one read-modify-write inside a transaction,
//! reading the row with an exclusive lock where the backend supports it.
//! Lifecycle mails are dispatched only after the transaction committed.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use vpnkeys_db::entities::{access_key, session, vpn_config};

use crate::collaborators::{with_timeout, Provisioner};
use crate::error::{Error, Result};
use crate::events::{EventMailer, KeyEvent};
use crate::sessions::close_open_sessions;
use crate::{Config, Key};

/// Issuance request; `amount` sibling keys share name prefix, days, config and email
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub name: String,
    pub days: i32,
    pub amount: i32,
    pub config_id: i32,
    pub email: Option<String>,
}

/// Partial edit of a key
#[derive(Debug, Clone, Default)]
pub struct KeyEdit {
    pub days: Option<i32>,
    pub email: Option<String>,
}

/// Result of a lifecycle transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub key: Key,
    /// `false` when the transition was an idempotent no-op
    pub changed: bool,
}

/// Whether the key's validity has run out at `now`
pub fn is_expired(key: &Key, now: DateTime<Utc>) -> bool {
    now > key.expires_at
}

fn add_days(from: DateTime<Utc>, days: i32) -> Result<DateTime<Utc>> {
    ChronoDuration::try_days(i64::from(days))
        .and_then(|delta| from.checked_add_signed(delta))
        .ok_or_else(|| Error::Validation(format!("{} days is out of the representable range", days)))
}

/// Expiry derived from the creation time, used at issuance and on edit
pub fn expiry_from(created: DateTime<Utc>, days: i32) -> Result<DateTime<Utc>> {
    add_days(created, days)
}

/// Expiry after renewing by `days`: counted from now for an expired key,
/// from the current expiry otherwise, so renewal never shortens validity.
pub fn renewed_expiry(
    current: DateTime<Utc>,
    now: DateTime<Utc>,
    days: i32,
) -> Result<DateTime<Utc>> {
    add_days(current.max(now), days)
}

fn sibling_names(name: &str, amount: i32) -> Vec<String> {
    if amount == 1 {
        vec![name.to_string()]
    } else {
        (1..=amount).map(|i| format!("{}_{}", name, i)).collect()
    }
}

fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

fn positive_days(days: i32) -> Result<()> {
    if days <= 0 {
        return Err(Error::Validation(format!("days must be positive, got {}", days)));
    }
    Ok(())
}

fn creation_order(select: Select<access_key::Entity>) -> Select<access_key::Entity> {
    select
        .order_by_asc(access_key::Column::Created)
        .order_by_asc(access_key::Column::Id)
}

#[derive(Clone)]
pub struct KeyStore {
    db: DatabaseConnection,
    provisioner: Arc<dyn Provisioner>,
    events: EventMailer,
    provision_timeout: Duration,
}

impl KeyStore {
    pub fn new(
        db: DatabaseConnection,
        provisioner: Arc<dyn Provisioner>,
        events: EventMailer,
        provision_timeout: Duration,
    ) -> Self {
        Self {
            db,
            provisioner,
            events,
            provision_timeout,
        }
    }

    // ============ queries ============

    pub async fn get(&self, id: i32) -> Result<Key> {
        access_key::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::key_not_found(id))
    }

    /// Key together with its current config
    pub async fn get_with_config(&self, id: i32) -> Result<(Key, Config)> {
        let (key, config) = access_key::Entity::find_by_id(id)
            .find_also_related(vpn_config::Entity)
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::key_not_found(id))?;
        let config = config.ok_or_else(|| Error::config_not_found(key.config_id))?;
        Ok((key, config))
    }

    /// All keys in creation order
    pub async fn list(&self) -> Result<Vec<Key>> {
        Ok(creation_order(access_key::Entity::find()).all(&self.db).await?)
    }

    /// Names are not unique across batches; every match is returned
    pub async fn get_by_name(&self, name: &str) -> Result<Vec<Key>> {
        debug!("Looking up keys named {}", name);
        Ok(creation_order(access_key::Entity::find())
            .filter(access_key::Column::Name.eq(name))
            .all(&self.db)
            .await?)
    }

    pub async fn get_by_config(&self, config_id: i32) -> Result<Vec<Key>> {
        Ok(creation_order(access_key::Entity::find())
            .filter(access_key::Column::ConfigId.eq(config_id))
            .all(&self.db)
            .await?)
    }

    pub async fn get_by_status(&self, active: bool) -> Result<Vec<Key>> {
        Ok(creation_order(access_key::Entity::find())
            .filter(access_key::Column::Status.eq(active))
            .all(&self.db)
            .await?)
    }

    pub async fn get_by_connected(&self, connected: bool) -> Result<Vec<Key>> {
        Ok(creation_order(access_key::Entity::find())
            .filter(access_key::Column::Connected.eq(connected))
            .all(&self.db)
            .await?)
    }

    // ============ issuance ============

    /// Issue `amount` keys. Either every key of the batch is stored and
    /// provisioned, or none is.
    pub async fn issue(&self, request: IssueRequest) -> Result<Vec<Key>> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("name must not be empty".into()));
        }
        positive_days(request.days)?;
        if request.amount <= 0 {
            return Err(Error::Validation(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }
        let email = normalize_email(request.email);

        let txn = self.db.begin().await?;
        let config = vpn_config::Entity::find_by_id(request.config_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                Error::Validation(format!("config {} does not exist", request.config_id))
            })?;

        let now = Utc::now();
        let expires_at = expiry_from(now, request.days)?;
        let mut issued: Vec<Key> = Vec::with_capacity(request.amount as usize);
        for key_name in sibling_names(&name, request.amount) {
            let key = access_key::ActiveModel {
                name: Set(key_name),
                days: Set(request.days),
                email: Set(email.clone()),
                config_id: Set(config.id),
                status: Set(true),
                connected: Set(false),
                created: Set(now),
                updated: Set(now),
                expires_at: Set(expires_at),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            let provisioned =
                with_timeout(self.provision_timeout, self.provisioner.issue(&key, &config)).await;
            if let Err(e) = provisioned {
                warn!("Provisioning key {} failed, rolling back batch: {}", key.name, e);
                self.revoke_quietly(&issued).await;
                txn.rollback().await?;
                return Err(Error::Provisioning(e.0));
            }
            issued.push(key);
        }
        txn.commit().await?;

        info!(
            "Issued {} key(s) named {} on config {} for {} days",
            issued.len(),
            name,
            config.id,
            request.days
        );
        for key in &issued {
            self.events.dispatch(KeyEvent::Created, key).await;
        }
        Ok(issued)
    }

    async fn revoke_quietly(&self, keys: &[Key]) {
        for key in keys {
            if let Err(e) = with_timeout(self.provision_timeout, self.provisioner.revoke(key)).await
            {
                warn!("Revoking credential of rolled back key {} failed: {}", key.name, e);
            }
        }
    }

    // ============ transitions ============

    /// Change days and/or email. Expiry is recomputed from the original
    /// creation time; status is untouched.
    pub async fn edit(&self, id: i32, edit: KeyEdit) -> Result<Key> {
        if let Some(days) = edit.days {
            positive_days(days)?;
        }

        let transition = self
            .mutate(id, |key, _now| {
                let mut active: access_key::ActiveModel = key.clone().into();
                if let Some(days) = edit.days {
                    active.days = Set(days);
                    active.expires_at = Set(expiry_from(key.created, days)?);
                }
                if edit.email.is_some() {
                    active.email = Set(normalize_email(edit.email));
                }
                Ok(Some(active))
            })
            .await?;

        info!("Key {} edited", id);
        self.events.dispatch(KeyEvent::Updated, &transition.key).await;
        Ok(transition.key)
    }

    /// Active -> Blocked. Blocking a connected key also clears `connected`
    /// and closes its open sessions.
    pub async fn block(&self, id: i32) -> Result<Transition> {
        let transition = self
            .mutate_offline(id, |key, _now| {
                if !key.status {
                    return Ok(None);
                }
                let mut active: access_key::ActiveModel = key.clone().into();
                active.status = Set(false);
                active.connected = Set(false);
                Ok(Some(active))
            })
            .await?;

        if transition.changed {
            info!("Key {} blocked", id);
            self.events.dispatch(KeyEvent::Blocked, &transition.key).await;
        }
        Ok(transition)
    }

    /// Blocked -> Active
    pub async fn unblock(&self, id: i32) -> Result<Transition> {
        let transition = self
            .mutate(id, |key, _now| {
                if key.status {
                    return Ok(None);
                }
                let mut active: access_key::ActiveModel = key.clone().into();
                active.status = Set(true);
                Ok(Some(active))
            })
            .await?;

        if transition.changed {
            info!("Key {} unblocked", id);
            self.events
                .dispatch(KeyEvent::Unblocked, &transition.key)
                .await;
        }
        Ok(transition)
    }

    /// Extend validity: new expiry = max(now, expiry) + days
    pub async fn renew(&self, id: i32, days: i32) -> Result<Key> {
        positive_days(days)?;

        let transition = self
            .mutate(id, |key, now| {
                let mut active: access_key::ActiveModel = key.clone().into();
                active.expires_at = Set(renewed_expiry(key.expires_at, now, days)?);
                Ok(Some(active))
            })
            .await?;

        info!(
            "Key {} renewed by {} days until {}",
            id, days, transition.key.expires_at
        );
        self.events.dispatch(KeyEvent::Renewed, &transition.key).await;
        Ok(transition.key)
    }

    /// Force `connected = false` and close open sessions without touching status
    pub async fn fix(&self, id: i32) -> Result<Transition> {
        let transition = self
            .mutate_offline(id, |key, _now| {
                if !key.connected {
                    return Ok(None);
                }
                let mut active: access_key::ActiveModel = key.clone().into();
                active.connected = Set(false);
                Ok(Some(active))
            })
            .await?;

        if transition.changed {
            info!("Key {} marked disconnected", id);
        }
        Ok(transition)
    }

    /// Reassign the key to another config. Session history stays with the key.
    pub async fn transfer(&self, id: i32, config_id: i32) -> Result<Key> {
        let txn = self.db.begin().await?;
        let key = Self::lock(&txn, id).await?;
        if vpn_config::Entity::find_by_id(config_id)
            .one(&txn)
            .await?
            .is_none()
        {
            return Err(Error::Validation(format!(
                "config {} does not exist",
                config_id
            )));
        }

        let from = key.config_id;
        let mut active: access_key::ActiveModel = key.into();
        active.config_id = Set(config_id);
        active.updated = Set(Utc::now());
        let key = active.update(&txn).await?;
        txn.commit().await?;

        info!("Key {} transferred from config {} to {}", id, from, config_id);
        self.events.dispatch(KeyEvent::Transferred, &key).await;
        Ok(key)
    }

    /// Replace the credential material; id, name, created and sessions are kept
    pub async fn recreate(&self, id: i32) -> Result<Key> {
        let (key, config) = self.get_with_config(id).await?;

        with_timeout(self.provision_timeout, self.provisioner.reissue(&key, &config))
            .await
            .map_err(|e| Error::Provisioning(e.0))?;

        let transition = self
            .mutate(id, |key, _now| Ok(Some(key.clone().into())))
            .await?;
        info!("Key {} recreated", id);
        Ok(transition.key)
    }

    /// Delete the key and all of its sessions. The rows are removed inside a
    /// transaction that commits only once the credential has been revoked.
    pub async fn delete(&self, id: i32) -> Result<Key> {
        let txn = self.db.begin().await?;
        let key = Self::lock(&txn, id).await?;
        let sessions = session::Entity::delete_many()
            .filter(session::Column::KeyId.eq(id))
            .exec(&txn)
            .await?;
        access_key::Entity::delete_by_id(id).exec(&txn).await?;

        if let Err(e) = with_timeout(self.provision_timeout, self.provisioner.revoke(&key)).await {
            txn.rollback().await?;
            return Err(Error::Provisioning(e.0));
        }
        txn.commit().await?;

        info!(
            "Key {} deleted together with {} session(s)",
            id, sessions.rows_affected
        );
        self.events.dispatch(KeyEvent::Deleted, &key).await;
        Ok(key)
    }

    // ============ read-modify-write ============

    async fn lock(txn: &DatabaseTransaction, id: i32) -> Result<Key> {
        access_key::Entity::find_by_id(id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| Error::key_not_found(id))
    }

    /// Run `f` against the locked current row. `Ok(None)` means no change;
    /// otherwise the returned model is written with a fresh `updated` stamp.
    async fn mutate<F>(&self, id: i32, f: F) -> Result<Transition>
    where
        F: FnOnce(&Key, DateTime<Utc>) -> Result<Option<access_key::ActiveModel>>,
    {
        self.mutate_with(id, false, f).await
    }

    /// Like [`Self::mutate`], also closing the key's open sessions in the
    /// same transaction. Closing an orphaned session counts as a change.
    async fn mutate_offline<F>(&self, id: i32, f: F) -> Result<Transition>
    where
        F: FnOnce(&Key, DateTime<Utc>) -> Result<Option<access_key::ActiveModel>>,
    {
        self.mutate_with(id, true, f).await
    }

    async fn mutate_with<F>(&self, id: i32, close_sessions: bool, f: F) -> Result<Transition>
    where
        F: FnOnce(&Key, DateTime<Utc>) -> Result<Option<access_key::ActiveModel>>,
    {
        let txn = self.db.begin().await?;
        let current = Self::lock(&txn, id).await?;
        let now = Utc::now();

        let update = f(&current, now)?;
        let closed = if close_sessions {
            close_open_sessions(&txn, id, now).await?
        } else {
            0
        };

        let transition = match update {
            Some(mut active) => {
                active.updated = Set(now);
                let key = active.update(&txn).await?;
                Transition { key, changed: true }
            }
            None => Transition {
                key: current,
                changed: closed > 0,
            },
        };
        txn.commit().await?;
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, CredentialBundle, MockNotifier, MockProvisioner};
    use crate::settings::SettingsStore;

    fn bundle(key: &Key) -> CredentialBundle {
        CredentialBundle {
            file_name: format!("{}.ovpn", key.name),
            contents: b"client".to_vec(),
        }
    }

    fn permissive_provisioner() -> MockProvisioner {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_issue().returning(|k, _| Ok(bundle(k)));
        provisioner.expect_reissue().returning(|k, _| Ok(bundle(k)));
        provisioner.expect_revoke().returning(|_| Ok(()));
        provisioner
    }

    async fn setup(provisioner: MockProvisioner) -> (KeyStore, DatabaseConnection, i32) {
        let db = vpnkeys_db::connect("sqlite::memory:").await.unwrap();
        vpnkeys_db::migrate(&db).await.unwrap();

        let now = Utc::now();
        let config = vpn_config::ActiveModel {
            port: Set(1194),
            telnet_port: Set(9999),
            address: Set("1.2.3.4".into()),
            protocol: Set(vpn_config::Protocol::Udp),
            subnet: Set("10.8.0.0/24".into()),
            status: Set(true),
            created: Set(now),
            updated: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let events = EventMailer::new(
            SettingsStore::new(db.clone()),
            Arc::new(MockNotifier::new()),
            Duration::from_secs(1),
        );
        let store = KeyStore::new(db.clone(), Arc::new(provisioner), events, Duration::from_secs(5));
        (store, db, config.id)
    }

    fn request(name: &str, amount: i32, config_id: i32) -> IssueRequest {
        IssueRequest {
            name: name.into(),
            days: 30,
            amount,
            config_id,
            email: None,
        }
    }

    #[tokio::test]
    async fn test_issue_sets_expiry_from_created() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;

        let keys = store.issue(request("alice", 1, config_id)).await.unwrap();

        assert_eq!(keys.len(), 1);
        let key = &keys[0];
        assert_eq!(key.name, "alice");
        assert!(key.status);
        assert!(!key.connected);
        assert_eq!(key.expires_at, expiry_from(key.created, 30).unwrap());
    }

    #[tokio::test]
    async fn test_issue_amount_creates_named_siblings() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;

        let keys = store.issue(request("team", 3, config_id)).await.unwrap();

        let names: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["team_1", "team_2", "team_3"]);
        assert!(keys.iter().all(|k| k.days == 30 && k.config_id == config_id));
    }

    #[tokio::test]
    async fn test_issue_validation() {
        let (store, _db, config_id) = setup(MockProvisioner::new()).await;

        let mut zero_days = request("a", 1, config_id);
        zero_days.days = 0;
        assert!(matches!(store.issue(zero_days).await, Err(Error::Validation(_))));
        assert!(matches!(
            store.issue(request("a", 0, config_id)).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.issue(request("a", 1, config_id + 100)).await,
            Err(Error::Validation(_))
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_issue_rolls_back_whole_batch_on_provisioning_failure() {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_issue().returning(|k, _| {
            if k.name == "batch_2" {
                Err(CollaboratorError::new("easyrsa failed"))
            } else {
                Ok(bundle(k))
            }
        });
        provisioner.expect_revoke().times(1).returning(|_| Ok(()));
        let (store, _db, config_id) = setup(provisioner).await;

        let err = store.issue(request("batch", 3, config_id)).await.unwrap_err();

        assert_eq!(err, Error::Provisioning("easyrsa failed".into()));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_recomputes_expiry_from_original_created() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);

        let edited = store
            .edit(
                key.id,
                KeyEdit {
                    days: Some(90),
                    email: Some("alice@example.com".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.created, key.created);
        assert_eq!(edited.expires_at, expiry_from(key.created, 90).unwrap());
        assert_eq!(edited.email.as_deref(), Some("alice@example.com"));
        assert!(edited.status);
    }

    #[tokio::test]
    async fn test_block_is_idempotent_and_unblock_restores() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);

        let first = store.block(key.id).await.unwrap();
        let second = store.block(key.id).await.unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.key, second.key);
        assert!(!second.key.status);

        let unblocked = store.unblock(key.id).await.unwrap();
        assert!(unblocked.changed);
        assert!(unblocked.key.status);
        assert!(!store.unblock(key.id).await.unwrap().changed);
    }

    #[tokio::test]
    async fn test_block_clears_connected() {
        let (store, db, config_id) = setup(permissive_provisioner()).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);
        let mut active: access_key::ActiveModel = key.clone().into();
        active.connected = Set(true);
        active.update(&db).await.unwrap();

        let blocked = store.block(key.id).await.unwrap().key;

        assert!(!blocked.status);
        assert!(!blocked.connected);
    }

    #[tokio::test]
    async fn test_renew_never_shortens() {
        let (store, db, config_id) = setup(permissive_provisioner()).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);

        let renewed = store.renew(key.id, 10).await.unwrap();
        assert_eq!(renewed.expires_at, key.expires_at + ChronoDuration::days(10));

        // An expired key renews from now, not from its stale expiry
        let mut active: access_key::ActiveModel = renewed.into();
        active.expires_at = Set(Utc::now() - ChronoDuration::days(100));
        active.update(&db).await.unwrap();

        let before = Utc::now();
        let revived = store.renew(key.id, 10).await.unwrap();
        assert!(revived.expires_at >= before + ChronoDuration::days(10));
        assert!(!is_expired(&revived, Utc::now()));
    }

    #[test]
    fn test_renewed_expiry_formula() {
        let now = Utc::now();
        let past = now - ChronoDuration::days(3);
        let future = now + ChronoDuration::days(3);

        assert_eq!(renewed_expiry(past, now, 5).unwrap(), now + ChronoDuration::days(5));
        assert_eq!(
            renewed_expiry(future, now, 5).unwrap(),
            future + ChronoDuration::days(5)
        );
        assert!(matches!(
            expiry_from(now, i32::MAX),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_days_are_rejected() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;

        let mut huge = request("alice", 1, config_id);
        huge.days = i32::MAX;
        assert!(matches!(store.issue(huge).await, Err(Error::Validation(_))));
        assert!(store.list().await.unwrap().is_empty());

        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);
        assert!(matches!(
            store.renew(key.id, i32::MAX).await,
            Err(Error::Validation(_))
        ));
        let edit = KeyEdit {
            days: Some(i32::MAX),
            email: None,
        };
        assert!(matches!(store.edit(key.id, edit).await, Err(Error::Validation(_))));
        assert_eq!(store.get(key.id).await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_fix_keeps_status() {
        let (store, db, config_id) = setup(permissive_provisioner()).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);
        let mut active: access_key::ActiveModel = key.clone().into();
        active.connected = Set(true);
        active.update(&db).await.unwrap();

        let fixed = store.fix(key.id).await.unwrap();
        assert!(fixed.changed);
        assert!(!fixed.key.connected);
        assert!(fixed.key.status);
        assert!(!store.fix(key.id).await.unwrap().changed);
    }

    #[tokio::test]
    async fn test_delete_keeps_key_when_revoke_fails() {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_issue().returning(|k, _| Ok(bundle(k)));
        provisioner
            .expect_revoke()
            .times(1)
            .returning(|_| Err(CollaboratorError::new("index.txt locked")));
        let (store, _db, config_id) = setup(provisioner).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);

        let err = store.delete(key.id).await.unwrap_err();

        assert_eq!(err, Error::Provisioning("index.txt locked".into()));
        assert_eq!(store.get(key.id).await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_delete_removes_key_after_revoke() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);

        assert_eq!(store.delete(key.id).await.unwrap(), key);
        assert!(matches!(store.get(key.id).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_transfer_validates_destination() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);

        let err = store.transfer(key.id, 999).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.get(key.id).await.unwrap().config_id, config_id);
    }

    #[tokio::test]
    async fn test_recreate_failure_leaves_key() {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_issue().returning(|k, _| Ok(bundle(k)));
        provisioner
            .expect_reissue()
            .returning(|_, _| Err(CollaboratorError::new("ca unavailable")));
        let (store, _db, config_id) = setup(provisioner).await;
        let key = store.issue(request("alice", 1, config_id)).await.unwrap().remove(0);

        let err = store.recreate(key.id).await.unwrap_err();

        assert!(matches!(err, Error::Provisioning(_)));
        assert_eq!(store.get(key.id).await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_get_by_name_returns_all_matches() {
        let (store, _db, config_id) = setup(permissive_provisioner()).await;
        store.issue(request("alice", 1, config_id)).await.unwrap();
        store.issue(request("alice", 1, config_id)).await.unwrap();
        store.issue(request("bob", 1, config_id)).await.unwrap();

        assert_eq!(store.get_by_name("alice").await.unwrap().len(), 2);
        assert_eq!(store.get_by_config(config_id).await.unwrap().len(), 3);
        assert_eq!(store.get_by_status(true).await.unwrap().len(), 3);
        assert!(store.get_by_connected(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_key_is_not_found() {
        let (store, _db, _config_id) = setup(MockProvisioner::new()).await;

        assert!(matches!(store.block(5).await, Err(Error::NotFound { .. })));
        assert!(matches!(store.renew(5, 3).await, Err(Error::NotFound { .. })));
        assert!(matches!(store.delete(5).await, Err(Error::NotFound { .. })));
    }
}
