//! Host-side collaborators: systemd, provisioning scripts, Telegram and SMTP
pub mod command;
pub mod mail;
pub mod maintenance;
pub mod notifier;
pub mod provision;
pub mod systemd;
pub mod telegram;

pub use mail::{SmtpMailer, SmtpParams};
pub use maintenance::ScriptMaintenance;
pub use notifier::ChannelNotifier;
pub use provision::ScriptProvisioner;
pub use systemd::SystemdServiceControl;
pub use telegram::TelegramBot;
