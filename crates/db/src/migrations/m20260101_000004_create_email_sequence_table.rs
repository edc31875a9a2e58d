//! Create email sequence table for drip campaigns.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailSequence::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailSequence::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailSequence::SubscriberEmail)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailSequence::SequenceType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailSequence::CurrentStep)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailSequence::TotalSteps)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailSequence::Status)
                            .string_len(16)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(EmailSequence::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmailSequence::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(EmailSequence::Metadata).json_binary().null())
                    .to_owned(),
            )
            .await?;

        // One sequence per subscriber and sequence type
        manager
            .create_index(
                Index::create()
                    .name("idx_email_sequence_subscriber_type")
                    .table(EmailSequence::Table)
                    .col(EmailSequence::SubscriberEmail)
                    .col(EmailSequence::SequenceType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailSequence::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum EmailSequence {
    #[iden = "email_sequences"]
    Table,
    Id,
    SubscriberEmail,
    SequenceType,
    CurrentStep,
    TotalSteps,
    Status,
    StartedAt,
    CompletedAt,
    Metadata,
}
