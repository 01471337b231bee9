//! Initial schema: configs, keys, sessions, settings

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. configs
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Configs::Table)
                    .if_not_exists()
                    .col(pk_auto(Configs::Id))
                    .col(integer(Configs::Port).unique_key())
                    .col(integer(Configs::TelnetPort))
                    .col(string_len(Configs::Address, 255))
                    .col(string_len(Configs::Protocol, 8))
                    .col(string_len(Configs::Subnet, 64))
                    .col(boolean(Configs::Status).default(true))
                    .col(
                        timestamp_with_time_zone(Configs::Created)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Configs::Updated)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. keys
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Keys::Table)
                    .if_not_exists()
                    .col(pk_auto(Keys::Id))
                    .col(string_len(Keys::Name, 255))
                    .col(integer(Keys::Days))
                    .col(string_len_null(Keys::Email, 255))
                    .col(integer(Keys::ConfigId))
                    .col(boolean(Keys::Status).default(true))
                    .col(boolean(Keys::Connected).default(false))
                    .col(
                        timestamp_with_time_zone(Keys::Created)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Keys::Updated)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone(Keys::ExpiresAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_keys_config_id")
                            .from(Keys::Table, Keys::ConfigId)
                            .to(Configs::Table, Configs::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_keys_config_id")
                    .table(Keys::Table)
                    .col(Keys::ConfigId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 3. sessions
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(pk_auto(Sessions::Id))
                    .col(integer(Sessions::KeyId))
                    .col(string_len(Sessions::Ip, 64))
                    .col(timestamp_with_time_zone(Sessions::Connected))
                    .col(timestamp_with_time_zone_null(Sessions::Disconnected))
                    .col(big_integer(Sessions::TotalBytes).default(0))
                    .col(big_integer(Sessions::TotalConnectedTime).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sessions_key_id")
                            .from(Sessions::Table, Sessions::KeyId)
                            .to(Keys::Table, Keys::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_key_id")
                    .table(Sessions::Table)
                    .col(Sessions::KeyId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 4. settings (single row)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(integer(Settings::Id).primary_key())
                    .col(string_len(Settings::BotToken, 255).default(""))
                    .col(string_len(Settings::BotChatId, 64).default(""))
                    .col(string_len_null(Settings::TelegraphToken, 255))
                    .col(boolean(Settings::UseMail).default(false))
                    .col(string_len_null(Settings::MailHost, 255))
                    .col(integer_null(Settings::MailPort))
                    .col(string_len_null(Settings::MailLogin, 255))
                    .col(string_len_null(Settings::MailPassword, 255))
                    .col(string_len(Settings::Subject, 255))
                    .col(text(Settings::Text))
                    .col(text(Settings::MailNotify))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Settings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Keys::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Configs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Configs {
    Table,
    Id,
    Port,
    TelnetPort,
    Address,
    Protocol,
    Subnet,
    Status,
    Created,
    Updated,
}

#[derive(DeriveIden)]
enum Keys {
    Table,
    Id,
    Name,
    Days,
    Email,
    ConfigId,
    Status,
    Connected,
    Created,
    Updated,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    Id,
    KeyId,
    Ip,
    Connected,
    Disconnected,
    TotalBytes,
    TotalConnectedTime,
}

#[derive(DeriveIden)]
enum Settings {
    Table,
    Id,
    BotToken,
    BotChatId,
    TelegraphToken,
    UseMail,
    MailHost,
    MailPort,
    MailLogin,
    MailPassword,
    Subject,
    Text,
    MailNotify,
}
