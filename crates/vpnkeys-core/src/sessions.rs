//! Session ledger: connection facts per key and their aggregation
//!
//! Sessions always store raw byte counts and seconds. Per-config totals are
//! attributed through each key's *current* `config_id`, so a transferred
//! key carries its whole history to the new config.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set, TransactionTrait,
};
use std::collections::HashMap;
use tracing::{debug, info};

use vpnkeys_db::entities::{access_key, session};

use crate::error::{Error, Result};
use crate::Session;

/// Aggregation scope of ledger totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Key(i32),
    /// Sessions of keys currently assigned to the config
    Config(i32),
}

/// Usage rollup of one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsage {
    pub total_bytes: i64,
    pub sessions: u64,
    pub connected_time: i64,
}

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}

fn non_negative_bytes(total_bytes: i64) -> Result<()> {
    if total_bytes < 0 {
        return Err(Error::Validation(format!(
            "total_bytes must not be negative, got {}",
            total_bytes
        )));
    }
    Ok(())
}

/// Close every open session of a key at `at`, for keys forced offline.
/// Runs on the caller's connection so it joins the caller's transaction.
pub(crate) async fn close_open_sessions<C: ConnectionTrait>(
    conn: &C,
    key_id: i32,
    at: DateTime<Utc>,
) -> Result<u64> {
    let open = session::Entity::find()
        .filter(session::Column::KeyId.eq(key_id))
        .filter(session::Column::Disconnected.is_null())
        .all(conn)
        .await?;

    let closed = open.len() as u64;
    for current in open {
        let connected = current.connected;
        let mut active: session::ActiveModel = current.into();
        active.disconnected = Set(Some(at.max(connected)));
        active.total_connected_time = Set(elapsed_secs(connected, at));
        active.update(conn).await?;
    }
    if closed > 0 {
        debug!("Closed {} open session(s) of key {}", closed, key_id);
    }
    Ok(closed)
}

#[derive(Clone)]
pub struct SessionLedger {
    db: DatabaseConnection,
}

impl SessionLedger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open a session for an active key and mark the key connected
    pub async fn record_connect(&self, key_id: i32, ip: &str, at: DateTime<Utc>) -> Result<Session> {
        if ip.trim().is_empty() {
            return Err(Error::Validation("ip must not be empty".into()));
        }

        let txn = self.db.begin().await?;
        let key = access_key::Entity::find_by_id(key_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| Error::key_not_found(key_id))?;
        if !key.status {
            return Err(Error::Validation(format!(
                "key {} is blocked and cannot connect",
                key_id
            )));
        }

        let session = session::ActiveModel {
            key_id: Set(key_id),
            ip: Set(ip.trim().to_string()),
            connected: Set(at),
            disconnected: Set(None),
            total_bytes: Set(0),
            total_connected_time: Set(0),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if !key.connected {
            let mut active: access_key::ActiveModel = key.into();
            active.connected = Set(true);
            active.updated = Set(Utc::now());
            active.update(&txn).await?;
        }
        txn.commit().await?;

        info!("Session {} opened for key {} from {}", session.id, key_id, session.ip);
        Ok(session)
    }

    /// Live counter update of an open session
    pub async fn record_traffic(
        &self,
        session_id: i32,
        total_bytes: i64,
        at: DateTime<Utc>,
    ) -> Result<Session> {
        non_negative_bytes(total_bytes)?;

        let txn = self.db.begin().await?;
        let current = Self::lock(&txn, session_id).await?;
        if current.disconnected.is_some() {
            return Err(Error::Validation(format!("session {} is closed", session_id)));
        }
        if total_bytes < current.total_bytes {
            return Err(Error::Validation(format!(
                "byte counter of session {} went backwards ({} < {})",
                session_id, total_bytes, current.total_bytes
            )));
        }

        let connected = current.connected;
        let mut active: session::ActiveModel = current.into();
        active.total_bytes = Set(total_bytes);
        active.total_connected_time = Set(elapsed_secs(connected, at));
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        debug!("Session {} at {} bytes", session_id, total_bytes);
        Ok(updated)
    }

    /// Close a session. The key's `connected` flag is cleared once its last
    /// open session closes.
    pub async fn record_disconnect(
        &self,
        session_id: i32,
        at: DateTime<Utc>,
        total_bytes: i64,
    ) -> Result<Session> {
        non_negative_bytes(total_bytes)?;

        let txn = self.db.begin().await?;
        let current = Self::lock(&txn, session_id).await?;
        if current.disconnected.is_some() {
            return Err(Error::Validation(format!(
                "session {} is already closed",
                session_id
            )));
        }
        if at < current.connected {
            return Err(Error::Validation(format!(
                "disconnect at {} precedes connect at {}",
                at, current.connected
            )));
        }

        let key_id = current.key_id;
        let connected = current.connected;
        let mut active: session::ActiveModel = current.into();
        active.disconnected = Set(Some(at));
        active.total_bytes = Set(total_bytes);
        active.total_connected_time = Set(elapsed_secs(connected, at));
        let closed = active.update(&txn).await?;

        let still_open = session::Entity::find()
            .filter(session::Column::KeyId.eq(key_id))
            .filter(session::Column::Disconnected.is_null())
            .count(&txn)
            .await?;
        if still_open == 0 {
            access_key::Entity::update_many()
                .col_expr(access_key::Column::Connected, Expr::value(false))
                .filter(access_key::Column::Id.eq(key_id))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        info!(
            "Session {} of key {} closed after {}s, {} bytes",
            session_id, key_id, closed.total_connected_time, closed.total_bytes
        );
        Ok(closed)
    }

    pub async fn get(&self, session_id: i32) -> Result<Session> {
        session::Entity::find_by_id(session_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Sessions of a key ordered by connect time
    pub async fn list_by_key(&self, key_id: i32) -> Result<Vec<Session>> {
        if access_key::Entity::find_by_id(key_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(Error::key_not_found(key_id));
        }

        Ok(session::Entity::find()
            .filter(session::Column::KeyId.eq(key_id))
            .order_by_asc(session::Column::Connected)
            .order_by_asc(session::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn count(&self, scope: Scope) -> Result<u64> {
        Ok(session::Entity::find()
            .apply_if(Self::scope_filter(scope), |q, cond| q.filter(cond))
            .count(&self.db)
            .await?)
    }

    pub async fn total_bytes(&self, scope: Scope) -> Result<i64> {
        let values: Vec<i64> = session::Entity::find()
            .select_only()
            .column(session::Column::TotalBytes)
            .apply_if(Self::scope_filter(scope), |q, cond| q.filter(cond))
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(values.into_iter().sum())
    }

    pub async fn total_connected_time(&self, scope: Scope) -> Result<i64> {
        let values: Vec<i64> = session::Entity::find()
            .select_only()
            .column(session::Column::TotalConnectedTime)
            .apply_if(Self::scope_filter(scope), |q, cond| q.filter(cond))
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(values.into_iter().sum())
    }

    /// Rollup of every key that has at least one session
    pub async fn usage_by_key(&self) -> Result<HashMap<i32, KeyUsage>> {
        let rows: Vec<(i32, i64, i64)> = session::Entity::find()
            .select_only()
            .column(session::Column::KeyId)
            .column(session::Column::TotalBytes)
            .column(session::Column::TotalConnectedTime)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut usage: HashMap<i32, KeyUsage> = HashMap::new();
        for (key_id, bytes, seconds) in rows {
            let entry = usage.entry(key_id).or_default();
            entry.total_bytes += bytes;
            entry.sessions += 1;
            entry.connected_time += seconds;
        }
        Ok(usage)
    }

    pub async fn usage_of_key(&self, key_id: i32) -> Result<KeyUsage> {
        Ok(KeyUsage {
            total_bytes: self.total_bytes(Scope::Key(key_id)).await?,
            sessions: self.count(Scope::Key(key_id)).await?,
            connected_time: self.total_connected_time(Scope::Key(key_id)).await?,
        })
    }

    /// Remove a key's session history; the key itself is untouched
    pub async fn clear(&self, key_id: i32) -> Result<u64> {
        if access_key::Entity::find_by_id(key_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(Error::key_not_found(key_id));
        }

        let deleted = session::Entity::delete_many()
            .filter(session::Column::KeyId.eq(key_id))
            .exec(&self.db)
            .await?;
        info!("Cleared {} session(s) of key {}", deleted.rows_affected, key_id);
        Ok(deleted.rows_affected)
    }

    /// Remove every session and mark every key disconnected
    pub async fn clear_all(&self) -> Result<u64> {
        let txn = self.db.begin().await?;
        let deleted = session::Entity::delete_many().exec(&txn).await?;
        access_key::Entity::update_many()
            .col_expr(access_key::Column::Connected, Expr::value(false))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!("Cleared all statistics: {} session(s)", deleted.rows_affected);
        Ok(deleted.rows_affected)
    }

    async fn lock<C: ConnectionTrait>(conn: &C, session_id: i32) -> Result<Session> {
        session::Entity::find_by_id(session_id)
            .lock_exclusive()
            .one(conn)
            .await?
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    fn scope_filter(scope: Scope) -> Option<sea_orm::Condition> {
        use sea_orm::Condition;
        match scope {
            Scope::All => None,
            Scope::Key(key_id) => Some(Condition::all().add(session::Column::KeyId.eq(key_id))),
            Scope::Config(config_id) => Some(
                Condition::all().add(
                    session::Column::KeyId.in_subquery(
                        access_key::Entity::find()
                            .select_only()
                            .column(access_key::Column::Id)
                            .filter(access_key::Column::ConfigId.eq(config_id))
                            .into_query(),
                    ),
                ),
            ),
        }
    }
}
