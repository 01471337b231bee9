//! Statistics aggregator: per-key, per-config and global rollups

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use vpnkeys_db::entities::{access_key, vpn_config};

use crate::error::{Error, Result};
use crate::format::format_bytes;
use crate::keys::is_expired;
use crate::sessions::{KeyUsage, SessionLedger};
use crate::Key;

/// Key counters shared by the global and per-config rollups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyCounts {
    pub total: u64,
    pub active: u64,
    pub blocked: u64,
    pub connected: u64,
    pub expired: u64,
    pub not_expired: u64,
}

impl KeyCounts {
    fn add(&mut self, key: &Key, now: DateTime<Utc>) {
        self.total += 1;
        if key.status {
            self.active += 1;
        } else {
            self.blocked += 1;
        }
        if key.connected {
            self.connected += 1;
        }
        if is_expired(key, now) {
            self.expired += 1;
        } else {
            self.not_expired += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigStats {
    pub id: i32,
    pub port: i32,
    pub protocol: vpn_config::Protocol,
    pub address: String,
    pub keys: KeyCounts,
    /// Traffic of the keys currently assigned to this config
    pub total_bytes: i64,
    pub traffic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    pub keys: KeyCounts,
    pub total_configs: u64,
    pub total_bytes: i64,
    pub total_traffic: String,
    pub configs: Vec<ConfigStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStats {
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

#[derive(Clone)]
pub struct StatsAggregator {
    db: DatabaseConnection,
    ledger: SessionLedger,
}

impl StatsAggregator {
    pub fn new(db: DatabaseConnection, ledger: SessionLedger) -> Self {
        Self { db, ledger }
    }

    /// Global rollup computed from one snapshot of keys, configs and usage
    pub async fn global(&self) -> Result<GlobalStats> {
        let now = Utc::now();
        let keys = access_key::Entity::find().all(&self.db).await?;
        let configs = vpn_config::Entity::find()
            .order_by_asc(vpn_config::Column::Created)
            .order_by_asc(vpn_config::Column::Id)
            .all(&self.db)
            .await?;
        let usage = self.ledger.usage_by_key().await?;

        let mut totals = KeyCounts::default();
        let mut per_config: HashMap<i32, (KeyCounts, i64)> = HashMap::new();
        for key in &keys {
            totals.add(key, now);
            let bytes = usage.get(&key.id).map(|u| u.total_bytes).unwrap_or(0);
            let entry = per_config.entry(key.config_id).or_default();
            entry.0.add(key, now);
            entry.1 += bytes;
        }
        let total_bytes: i64 = usage.values().map(|u| u.total_bytes).sum();

        let configs: Vec<ConfigStats> = configs
            .into_iter()
            .map(|config| {
                let (counts, bytes) = per_config.remove(&config.id).unwrap_or_default();
                ConfigStats {
                    id: config.id,
                    port: config.port,
                    protocol: config.protocol,
                    address: config.address,
                    keys: counts,
                    total_bytes: bytes,
                    traffic: format_bytes(bytes),
                }
            })
            .collect();

        debug!(
            "Statistics over {} key(s) and {} config(s)",
            totals.total,
            configs.len()
        );
        Ok(GlobalStats {
            keys: totals,
            total_configs: configs.len() as u64,
            total_bytes,
            total_traffic: format_bytes(total_bytes),
            configs,
        })
    }

    pub async fn for_key(&self, key_id: i32) -> Result<KeyStats> {
        let key = access_key::Entity::find_by_id(key_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::key_not_found(key_id))?;
        let usage: KeyUsage = self.ledger.usage_of_key(key_id).await?;

        Ok(KeyStats {
            id: key.id,
            name: key.name.clone(),
            config_id: key.config_id,
            status: key.status,
            connected: key.connected,
            expired: is_expired(&key, Utc::now()),
            sessions: usage.sessions,
            total_bytes: usage.total_bytes,
            traffic: format_bytes(usage.total_bytes),
            total_connected_time: usage.connected_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{ActiveModelTrait, Set};

    #[test]
    fn test_key_counts_partition() {
        let now = Utc::now();
        let mut counts = KeyCounts::default();
        let base = Key {
            id: 1,
            name: "a".into(),
            days: 30,
            email: None,
            config_id: 1,
            status: true,
            connected: true,
            created: now,
            updated: now,
            expires_at: now + Duration::days(1),
        };
        counts.add(&base, now);
        counts.add(
            &Key {
                status: false,
                connected: false,
                expires_at: now - Duration::days(1),
                ..base.clone()
            },
            now,
        );

        assert_eq!(counts.total, 2);
        assert_eq!(counts.active + counts.blocked, counts.total);
        assert_eq!(counts.expired + counts.not_expired, counts.total);
        assert_eq!(counts.connected, 1);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let db = vpnkeys_db::connect("sqlite::memory:").await.unwrap();
        vpnkeys_db::migrate(&db).await.unwrap();
        let stats = StatsAggregator::new(db.clone(), SessionLedger::new(db));

        let global = stats.global().await.unwrap();

        assert_eq!(global.keys, KeyCounts::default());
        assert_eq!(global.total_configs, 0);
        assert_eq!(global.total_traffic, "0.0 B");
        assert!(matches!(stats.for_key(1).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_config_without_keys_is_listed() {
        let db = vpnkeys_db::connect("sqlite::memory:").await.unwrap();
        vpnkeys_db::migrate(&db).await.unwrap();
        let now = Utc::now();
        vpn_config::ActiveModel {
            port: Set(1194),
            telnet_port: Set(9999),
            address: Set("1.2.3.4".into()),
            protocol: Set(vpn_config::Protocol::Tcp),
            subnet: Set("10.8.0.0/24".into()),
            status: Set(true),
            created: Set(now),
            updated: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        let stats = StatsAggregator::new(db.clone(), SessionLedger::new(db));

        let global = stats.global().await.unwrap();

        assert_eq!(global.total_configs, 1);
        assert_eq!(global.configs[0].port, 1194);
        assert_eq!(global.configs[0].keys.total, 0);
        assert_eq!(global.configs[0].traffic, "0.0 B");
    }
}
