//! Indexes backing the name / status / expiry key filters

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_keys_name")
                    .table(Keys::Table)
                    .col(Keys::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_keys_status")
                    .table(Keys::Table)
                    .col(Keys::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_keys_expires_at")
                    .table(Keys::Table)
                    .col(Keys::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in ["idx_keys_expires_at", "idx_keys_status", "idx_keys_name"] {
            manager
                .drop_index(Index::drop().name(name).table(Keys::Table).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Keys {
    Table,
    Name,
    Status,
    ExpiresAt,
}
