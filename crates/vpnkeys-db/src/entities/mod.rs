//! Database entities

pub mod access_key;
pub mod session;
pub mod settings;
pub mod vpn_config;

pub use access_key::Entity as AccessKey;
pub use session::Entity as Session;
pub use settings::Entity as Settings;
pub use vpn_config::Entity as VpnConfig;

pub mod prelude {
    pub use super::access_key::Entity as AccessKey;
    pub use super::session::Entity as Session;
    pub use super::settings::Entity as Settings;
    pub use super::vpn_config::Entity as VpnConfig;
}
