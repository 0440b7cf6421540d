//! Database migrations for the moussem catalog.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_20_000001_create_reference_tables;
mod m2025_11_20_000002_create_sources;
mod m2025_11_20_000003_create_events;
mod m2025_11_20_000004_create_event_sources;
mod m2025_11_20_000005_create_candidates;
mod m2025_11_20_000006_create_fingerprints;
mod m2025_11_20_000007_create_editorial_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_20_000001_create_reference_tables::Migration),
            Box::new(m2025_11_20_000002_create_sources::Migration),
            Box::new(m2025_11_20_000003_create_events::Migration),
            Box::new(m2025_11_20_000004_create_event_sources::Migration),
            Box::new(m2025_11_20_000005_create_candidates::Migration),
            Box::new(m2025_11_20_000006_create_fingerprints::Migration),
            Box::new(m2025_11_20_000007_create_editorial_log::Migration),
        ]
    }
}
