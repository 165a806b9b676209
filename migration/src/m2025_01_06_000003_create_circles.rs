//! Migration to create circles and their memberships.
//!
//! Circles and groups share one table; `kind` tells them apart.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Circles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Circles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Circles::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Circles::Name).text().not_null())
                    .col(
                        ColumnDef::new(Circles::Kind)
                            .string_len(16)
                            .not_null()
                            .default("circle"),
                    )
                    .col(ColumnDef::new(Circles::Description).text().null())
                    .col(ColumnDef::new(Circles::OwnerId).uuid().not_null())
                    .col(
                        ColumnDef::new(Circles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_circles_tenant_id")
                            .from(Circles::Table, Circles::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CircleMemberships::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CircleMemberships::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CircleMemberships::TenantId).uuid().not_null())
                    .col(ColumnDef::new(CircleMemberships::CircleId).uuid().not_null())
                    .col(ColumnDef::new(CircleMemberships::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(CircleMemberships::Role)
                            .string_len(16)
                            .not_null()
                            .default("member"),
                    )
                    .col(
                        ColumnDef::new(CircleMemberships::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_circle_memberships_circle_id")
                            .from(CircleMemberships::Table, CircleMemberships::CircleId)
                            .to(Circles::Table, Circles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_circle_memberships_user_id")
                            .from(CircleMemberships::Table, CircleMemberships::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_circle_memberships_circle_user")
                    .table(CircleMemberships::Table)
                    .col(CircleMemberships::CircleId)
                    .col(CircleMemberships::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_circle_memberships_user_id")
                    .table(CircleMemberships::Table)
                    .col(CircleMemberships::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CircleMemberships::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Circles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Circles {
    Table,
    Id,
    TenantId,
    Name,
    Kind,
    Description,
    OwnerId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CircleMemberships {
    Table,
    Id,
    TenantId,
    CircleId,
    UserId,
    Role,
    JoinedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
