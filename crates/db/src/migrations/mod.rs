//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20260101_000001_create_job_table;
mod m20260101_000002_create_job_log_table;
mod m20260101_000003_create_rate_limit_table;
mod m20260101_000004_create_email_sequence_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_job_table::Migration),
            Box::new(m20260101_000002_create_job_log_table::Migration),
            Box::new(m20260101_000003_create_rate_limit_table::Migration),
            Box::new(m20260101_000004_create_email_sequence_table::Migration),
        ]
    }
}
