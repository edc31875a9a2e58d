//! Create job table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Job::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Job::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Job::Type).string_len(32).not_null())
                    .col(ColumnDef::new(Job::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(Job::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Job::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Job::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Job::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Job::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Job::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Job::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Job::Error).text().null())
                    .col(
                        ColumnDef::new(Job::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Dispatch selection: pending jobs by priority, then schedule
        manager
            .create_index(
                Index::create()
                    .name("idx_job_dispatch")
                    .table(Job::Table)
                    .col(Job::Status)
                    .col((Job::Priority, IndexOrder::Desc))
                    .col(Job::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        // Cleanup scans terminal jobs by age
        manager
            .create_index(
                Index::create()
                    .name("idx_job_created_at")
                    .table(Job::Table)
                    .col(Job::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Job::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Job {
    #[iden = "jobs"]
    Table,
    Id,
    Type,
    Payload,
    Status,
    Priority,
    Attempts,
    MaxAttempts,
    ScheduledAt,
    StartedAt,
    CompletedAt,
    Error,
    CreatedAt,
}
