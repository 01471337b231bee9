//! Connection session entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub key_id: i32,

    /// Remote address the client connected from
    pub ip: String,

    pub connected: ChronoDateTimeUtc,

    /// NULL while the session is open
    pub disconnected: Option<ChronoDateTimeUtc>,

    /// Raw byte count, never formatted at rest
    pub total_bytes: i64,

    /// Seconds
    pub total_connected_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::access_key::Entity",
        from = "Column::KeyId",
        to = "super::access_key::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Key,
}

impl Related<super::access_key::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Key.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
