//! Notification settings, a single-row table (id is always [`SINGLETON_ID`])

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const SINGLETON_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    pub bot_token: String,

    pub bot_chat_id: String,

    #[sea_orm(nullable)]
    pub telegraph_token: Option<String>,

    pub use_mail: bool,

    #[sea_orm(nullable)]
    pub mail_host: Option<String>,

    #[sea_orm(nullable)]
    pub mail_port: Option<i32>,

    #[sea_orm(nullable)]
    pub mail_login: Option<String>,

    #[sea_orm(nullable)]
    pub mail_password: Option<String>,

    /// Mail subject used when sending a key
    pub subject: String,

    /// Mail body used when sending a key
    #[sea_orm(column_type = "Text")]
    pub text: String,

    /// JSON object of per-event mail toggles
    #[sea_orm(column_type = "Text")]
    pub mail_notify: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
