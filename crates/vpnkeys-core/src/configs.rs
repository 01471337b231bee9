//! Config registry: VPN server configurations and their service units

use chrono::Utc;
use ipnetwork::IpNetwork;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use vpnkeys_db::entities::{access_key, vpn_config};

use crate::collaborators::{with_timeout, ServiceControl};
use crate::error::{Error, Result};
use crate::Config;

/// Management port used when a config is created without one
pub const DEFAULT_TELNET_PORT: i32 = 9999;

/// Parameters of a new config
#[derive(Debug, Clone)]
pub struct NewConfig {
    pub port: i32,
    pub protocol: String,
    pub telnet_port: Option<i32>,
    pub address: String,
    pub subnet: String,
}

/// Maps a config onto the name of its OS service unit.
///
/// The template may use `{port}` and `{id}`, e.g. `openvpn-server@{port}`.
#[derive(Debug, Clone)]
pub struct UnitNaming {
    template: String,
}

impl UnitNaming {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn unit_for(&self, config: &Config) -> String {
        self.template
            .replace("{port}", &config.port.to_string())
            .replace("{id}", &config.id.to_string())
    }
}

impl Default for UnitNaming {
    fn default() -> Self {
        Self::new("openvpn-server@{port}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UnitAction {
    Start,
    Stop,
    Restart,
}

#[derive(Clone)]
pub struct ConfigRegistry {
    db: DatabaseConnection,
    service: Arc<dyn ServiceControl>,
    naming: UnitNaming,
    service_timeout: Duration,
}

impl ConfigRegistry {
    pub fn new(
        db: DatabaseConnection,
        service: Arc<dyn ServiceControl>,
        naming: UnitNaming,
        service_timeout: Duration,
    ) -> Self {
        Self {
            db,
            service,
            naming,
            service_timeout,
        }
    }

    pub fn unit_for(&self, config: &Config) -> String {
        self.naming.unit_for(config)
    }

    /// All configs in creation order
    pub async fn list(&self) -> Result<Vec<Config>> {
        debug!("Listing configs");
        Ok(vpn_config::Entity::find()
            .order_by_asc(vpn_config::Column::Created)
            .order_by_asc(vpn_config::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get(&self, id: i32) -> Result<Config> {
        vpn_config::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::config_not_found(id))
    }

    pub async fn create(&self, new: NewConfig) -> Result<Config> {
        let protocol: vpn_config::Protocol = new.protocol.parse().map_err(Error::Validation)?;
        validate_port("port", new.port)?;
        let telnet_port = new.telnet_port.unwrap_or(DEFAULT_TELNET_PORT);
        validate_port("telnet_port", telnet_port)?;
        if new.address.trim().is_empty() {
            return Err(Error::Validation("address must not be empty".into()));
        }
        let subnet: IpNetwork = new
            .subnet
            .trim()
            .parse()
            .map_err(|e| Error::Validation(format!("subnet '{}': {}", new.subnet, e)))?;

        let txn = self.db.begin().await?;
        let taken = vpn_config::Entity::find()
            .filter(vpn_config::Column::Port.eq(new.port))
            .count(&txn)
            .await?;
        if taken > 0 {
            return Err(Error::Conflict(format!("port {} is already in use", new.port)));
        }

        let now = Utc::now();
        let config = vpn_config::ActiveModel {
            port: Set(new.port),
            telnet_port: Set(telnet_port),
            address: Set(new.address.trim().to_string()),
            protocol: Set(protocol),
            subnet: Set(subnet.to_string()),
            status: Set(true),
            created: Set(now),
            updated: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(
            "Config {} created: {}:{} ({})",
            config.id, config.address, config.port, config.protocol
        );
        Ok(config)
    }

    /// Delete a config. Rejected with `Conflict` while keys still reference it.
    pub async fn delete(&self, id: i32) -> Result<()> {
        let txn = self.db.begin().await?;
        if vpn_config::Entity::find_by_id(id).one(&txn).await?.is_none() {
            return Err(Error::config_not_found(id));
        }

        let keys = access_key::Entity::find()
            .filter(access_key::Column::ConfigId.eq(id))
            .count(&txn)
            .await?;
        if keys > 0 {
            return Err(Error::Conflict(format!(
                "config {} is referenced by {} key(s); transfer or delete them first",
                id, keys
            )));
        }

        vpn_config::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!("Config {} deleted", id);
        Ok(())
    }

    /// Start or stop the config's unit; status is committed only after the
    /// service manager acknowledges.
    pub async fn set_enabled(&self, id: i32, enabled: bool) -> Result<Config> {
        let action = if enabled {
            UnitAction::Start
        } else {
            UnitAction::Stop
        };
        self.control(id, action, enabled).await
    }

    pub async fn restart(&self, id: i32) -> Result<Config> {
        self.control(id, UnitAction::Restart, true).await
    }

    async fn control(&self, id: i32, action: UnitAction, status: bool) -> Result<Config> {
        let config = self.get(id).await?;
        let unit = self.naming.unit_for(&config);

        let service = self.service.clone();
        let call = async {
            match action {
                UnitAction::Start => service.start(&unit).await,
                UnitAction::Stop => service.stop(&unit).await,
                UnitAction::Restart => service.restart(&unit).await,
            }
        };
        if let Err(e) = with_timeout(self.service_timeout, call).await {
            warn!("{:?} of {} failed, config {} left unchanged: {}", action, unit, id, e);
            return Err(Error::ServiceControl {
                unit,
                output: e.0,
            });
        }

        let txn = self.db.begin().await?;
        let current = vpn_config::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::config_not_found(id))?;
        let mut active: vpn_config::ActiveModel = current.into();
        active.status = Set(status);
        active.updated = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!("{:?} of {} acknowledged, config {} status={}", action, unit, id, status);
        Ok(updated)
    }
}

fn validate_port(field: &str, port: i32) -> Result<()> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(Error::Validation(format!("{} {} out of range", field, port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, MockServiceControl};
    use mockall::predicate::eq;

    async fn test_db() -> DatabaseConnection {
        let db = vpnkeys_db::connect("sqlite::memory:").await.unwrap();
        vpnkeys_db::migrate(&db).await.unwrap();
        db
    }

    fn registry(db: DatabaseConnection, service: MockServiceControl) -> ConfigRegistry {
        ConfigRegistry::new(
            db,
            Arc::new(service),
            UnitNaming::default(),
            Duration::from_secs(5),
        )
    }

    fn udp(port: i32) -> NewConfig {
        NewConfig {
            port,
            protocol: "udp".into(),
            telnet_port: None,
            address: "1.2.3.4".into(),
            subnet: "10.8.0.0/24".into(),
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let registry = registry(test_db().await, MockServiceControl::new());

        let config = registry.create(udp(1194)).await.unwrap();

        assert!(config.status);
        assert_eq!(config.telnet_port, DEFAULT_TELNET_PORT);
        assert_eq!(config.protocol, vpn_config::Protocol::Udp);
        assert_eq!(config.created, config.updated);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_port() {
        let registry = registry(test_db().await, MockServiceControl::new());
        registry.create(udp(1194)).await.unwrap();

        let err = registry.create(udp(1194)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let registry = registry(test_db().await, MockServiceControl::new());

        let mut bad_protocol = udp(1194);
        bad_protocol.protocol = "icmp".into();
        let mut bad_subnet = udp(1195);
        bad_subnet.subnet = "10.8.0.0/99".into();

        assert!(matches!(
            registry.create(bad_protocol).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            registry.create(bad_subnet).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            registry.create(udp(0)).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let registry = registry(test_db().await, MockServiceControl::new());
        for port in [1196, 1194, 1195] {
            registry.create(udp(port)).await.unwrap();
        }

        let ports: Vec<i32> = registry.list().await.unwrap().iter().map(|c| c.port).collect();
        assert_eq!(ports, vec![1196, 1194, 1195]);
    }

    #[tokio::test]
    async fn test_disable_commits_after_ack() {
        let mut service = MockServiceControl::new();
        service
            .expect_stop()
            .with(eq("openvpn-server@1194"))
            .times(1)
            .returning(|_| Ok(String::new()));
        let registry = registry(test_db().await, service);
        let config = registry.create(udp(1194)).await.unwrap();

        let disabled = registry.set_enabled(config.id, false).await.unwrap();
        assert!(!disabled.status);
        assert!(!registry.get(config.id).await.unwrap().status);
    }

    #[tokio::test]
    async fn test_failed_restart_leaves_status() {
        let mut service = MockServiceControl::new();
        service.expect_stop().returning(|_| Ok(String::new()));
        service
            .expect_restart()
            .returning(|_| Err(CollaboratorError::new("Job failed")));
        let registry = registry(test_db().await, service);
        let config = registry.create(udp(1194)).await.unwrap();
        registry.set_enabled(config.id, false).await.unwrap();

        let err = registry.restart(config.id).await.unwrap_err();

        assert_eq!(
            err,
            Error::ServiceControl {
                unit: "openvpn-server@1194".into(),
                output: "Job failed".into()
            }
        );
        assert!(!registry.get(config.id).await.unwrap().status);
    }

    #[tokio::test]
    async fn test_unknown_config_is_not_found() {
        let registry = registry(test_db().await, MockServiceControl::new());

        assert!(matches!(registry.get(7).await, Err(Error::NotFound { .. })));
        assert!(matches!(registry.delete(7).await, Err(Error::NotFound { .. })));
        assert!(matches!(
            registry.set_enabled(7, true).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_unit_naming_placeholders() {
        let naming = UnitNaming::new("openvpn@server{id}-{port}");
        let now = Utc::now();
        let config = Config {
            id: 3,
            port: 1195,
            telnet_port: 9999,
            address: "1.2.3.4".into(),
            protocol: vpn_config::Protocol::Tcp,
            subnet: "10.8.0.0/24".into(),
            status: true,
            created: now,
            updated: now,
        };
        assert_eq!(naming.unit_for(&config), "openvpn@server3-1195");
    }
}
