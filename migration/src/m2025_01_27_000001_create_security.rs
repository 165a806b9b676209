//! Migration to create failed login tracking and IP blocks.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FailedLoginAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FailedLoginAttempts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FailedLoginAttempts::TenantId).uuid().null())
                    .col(
                        ColumnDef::new(FailedLoginAttempts::IpAddress)
                            .string_len(45)
                            .not_null(),
                    )
                    .col(ColumnDef::new(FailedLoginAttempts::Email).text().not_null())
                    .col(
                        ColumnDef::new(FailedLoginAttempts::AttemptedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_failed_login_attempts_ip_attempted")
                    .table(FailedLoginAttempts::Table)
                    .col(FailedLoginAttempts::IpAddress)
                    .col(FailedLoginAttempts::AttemptedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BlockedIps::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BlockedIps::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(BlockedIps::IpAddress).string_len(45).not_null())
                    .col(ColumnDef::new(BlockedIps::Reason).text().not_null())
                    .col(
                        ColumnDef::new(BlockedIps::BlockedUntil)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BlockedIps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_blocked_ips_ip_address")
                    .table(BlockedIps::Table)
                    .col(BlockedIps::IpAddress)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BlockedIps::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FailedLoginAttempts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FailedLoginAttempts {
    Table,
    Id,
    TenantId,
    IpAddress,
    Email,
    AttemptedAt,
}

#[derive(DeriveIden)]
enum BlockedIps {
    Table,
    Id,
    IpAddress,
    Reason,
    BlockedUntil,
    CreatedAt,
}
