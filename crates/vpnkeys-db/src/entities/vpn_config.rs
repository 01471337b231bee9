//! VPN server configuration entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transport protocol the VPN instance listens on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[sea_orm(string_value = "udp")]
    Udp,

    #[sea_orm(string_value = "tcp")]
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(format!("unknown protocol '{}', expected udp or tcp", other)),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Listening port of the VPN instance (unique)
    #[sea_orm(unique)]
    pub port: i32,

    /// Management interface port
    pub telnet_port: i32,

    /// Public address clients connect to
    pub address: String,

    pub protocol: Protocol,

    /// Client address pool in CIDR notation
    pub subnet: String,

    /// Whether the service unit is running
    pub status: bool,

    pub created: ChronoDateTimeUtc,

    pub updated: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Keys issued against this config
    #[sea_orm(has_many = "super::access_key::Entity")]
    Keys,
}

impl Related<super::access_key::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Keys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
