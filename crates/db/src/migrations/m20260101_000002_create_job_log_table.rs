//! Create job log table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JobLog::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(JobLog::JobId).string().not_null())
                    .col(ColumnDef::new(JobLog::Level).string_len(8).not_null())
                    .col(ColumnDef::new(JobLog::Message).text().not_null())
                    .col(ColumnDef::new(JobLog::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(JobLog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_log_job")
                            .from(JobLog::Table, JobLog::JobId)
                            .to(Job::Table, Job::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_job_log_job_id")
                    .table(JobLog::Table)
                    .col(JobLog::JobId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum JobLog {
    #[iden = "job_logs"]
    Table,
    Id,
    JobId,
    Level,
    Message,
    Metadata,
    CreatedAt,
}

#[derive(Iden)]
pub enum Job {
    #[iden = "jobs"]
    Table,
    Id,
}
