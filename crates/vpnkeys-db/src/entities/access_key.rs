//! Access key entity: one issued VPN credential bound to a config

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// External identity, also used as the notification target name
    pub name: String,

    /// Validity in days at issuance (or as last edited)
    pub days: i32,

    #[sea_orm(nullable)]
    pub email: Option<String>,

    pub config_id: i32,

    /// `true` = active, `false` = blocked
    pub status: bool,

    /// Whether the key currently has an open session
    pub connected: bool,

    pub created: ChronoDateTimeUtc,

    pub updated: ChronoDateTimeUtc,

    /// Stored expiry; recomputed on edit and extended on renew
    pub expires_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Key belongs to a config
    #[sea_orm(
        belongs_to = "super::vpn_config::Entity",
        from = "Column::ConfigId",
        to = "super::vpn_config::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Config,

    /// Key owns its sessions
    #[sea_orm(has_many = "super::session::Entity")]
    Sessions,
}

impl Related<super::vpn_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Config.def()
    }
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
