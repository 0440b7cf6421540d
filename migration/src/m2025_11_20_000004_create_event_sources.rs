//! Migration to create the event_sources provenance table.
//!
//! Every ingestion-populated attribute of an event must be explainable by at
//! least one row here.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EventSources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventSources::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventSources::EventId).integer().not_null())
                    .col(ColumnDef::new(EventSources::SourceId).integer().not_null())
                    .col(ColumnDef::new(EventSources::ExternalId).text().null())
                    .col(ColumnDef::new(EventSources::SourceUrl).text().null())
                    .col(
                        ColumnDef::new(EventSources::RawPayload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EventSources::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EventSources::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_sources_event_id")
                            .from(EventSources::Table, EventSources::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_sources_source_id")
                            .from(EventSources::Table, EventSources::SourceId)
                            .to(Sources::Table, Sources::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_event_sources_event")
                    .table(EventSources::Table)
                    .col(EventSources::EventId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_event_sources_source_external")
                    .table(EventSources::Table)
                    .col(EventSources::SourceId)
                    .col(EventSources::ExternalId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_event_sources_source_external")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_event_sources_event").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventSources::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EventSources {
    Table,
    Id,
    EventId,
    SourceId,
    ExternalId,
    SourceUrl,
    RawPayload,
    FetchedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Sources {
    Table,
    Id,
}
