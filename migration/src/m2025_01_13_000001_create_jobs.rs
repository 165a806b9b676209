//! Migration to create job postings and precomputed match scores.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobPostings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobPostings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobPostings::TenantId).uuid().not_null())
                    .col(ColumnDef::new(JobPostings::EmployerId).uuid().not_null())
                    .col(ColumnDef::new(JobPostings::Title).text().not_null())
                    .col(ColumnDef::new(JobPostings::Description).text().not_null())
                    .col(ColumnDef::new(JobPostings::Location).text().null())
                    .col(ColumnDef::new(JobPostings::RequiredSkills).json().not_null())
                    .col(ColumnDef::new(JobPostings::PreferredSkills).json().not_null())
                    .col(
                        ColumnDef::new(JobPostings::Status)
                            .string_len(16)
                            .not_null()
                            .default("open"),
                    )
                    .col(
                        ColumnDef::new(JobPostings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(JobPostings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_postings_tenant_id")
                            .from(JobPostings::Table, JobPostings::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_postings_employer_id")
                            .from(JobPostings::Table, JobPostings::EmployerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobMatchScores::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobMatchScores::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobMatchScores::TenantId).uuid().not_null())
                    .col(ColumnDef::new(JobMatchScores::JobId).uuid().not_null())
                    .col(ColumnDef::new(JobMatchScores::UserId).uuid().not_null())
                    .col(ColumnDef::new(JobMatchScores::Score).double().not_null())
                    .col(ColumnDef::new(JobMatchScores::MatchedSkills).json().not_null())
                    .col(ColumnDef::new(JobMatchScores::MissingSkills).json().not_null())
                    .col(
                        ColumnDef::new(JobMatchScores::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_match_scores_job_id")
                            .from(JobMatchScores::Table, JobMatchScores::JobId)
                            .to(JobPostings::Table, JobPostings::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_match_scores_user_id")
                            .from(JobMatchScores::Table, JobMatchScores::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_job_match_scores_job_user")
                    .table(JobMatchScores::Table)
                    .col(JobMatchScores::JobId)
                    .col(JobMatchScores::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobMatchScores::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JobPostings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum JobPostings {
    Table,
    Id,
    TenantId,
    EmployerId,
    Title,
    Description,
    Location,
    RequiredSkills,
    PreferredSkills,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum JobMatchScores {
    Table,
    Id,
    TenantId,
    JobId,
    UserId,
    Score,
    MatchedSkills,
    MissingSkills,
    ComputedAt,
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
