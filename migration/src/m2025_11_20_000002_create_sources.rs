//! Migration to create the sources table.
//!
//! A source is a named producer of event records. Its reliability score
//! drives both confidence scoring and overwrite precedence on merge.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sources::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sources::Name).text().not_null().unique_key())
                    .col(ColumnDef::new(Sources::SourceType).text().not_null())
                    .col(
                        ColumnDef::new(Sources::ReliabilityScore)
                            .double()
                            .not_null()
                            .default(0.5),
                    )
                    .col(ColumnDef::new(Sources::HistoricalAccuracy).double().null())
                    .col(
                        ColumnDef::new(Sources::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Sources::Endpoint).text().null())
                    .col(
                        ColumnDef::new(Sources::LastFetchAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Sources::CreatedAt)
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
                    .name("idx_sources_active_type")
                    .table(Sources::Table)
                    .col(Sources::IsActive)
                    .col(Sources::SourceType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_sources_active_type").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sources::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sources {
    Table,
    Id,
    Name,
    SourceType,
    ReliabilityScore,
    HistoricalAccuracy,
    IsActive,
    Endpoint,
    LastFetchAt,
    CreatedAt,
}
