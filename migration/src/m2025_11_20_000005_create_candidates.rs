//! Migration to create the candidates staging table.
//!
//! Candidates are append-only: the same upstream record fetched twice yields
//! two rows, and deduplication happens downstream in the resolver.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Candidates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Candidates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Candidates::SourceId).integer().not_null())
                    .col(ColumnDef::new(Candidates::ExternalId).text().null())
                    .col(ColumnDef::new(Candidates::SourceUrl).text().null())
                    .col(
                        ColumnDef::new(Candidates::RawPayload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Candidates::Normalized)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Candidates::Processed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Candidates::Outcome).text().null())
                    .col(ColumnDef::new(Candidates::MatchedEventId).integer().null())
                    .col(ColumnDef::new(Candidates::MatchConfidence).double().null())
                    .col(
                        ColumnDef::new(Candidates::IngestedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Candidates::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_candidates_source_id")
                            .from(Candidates::Table, Candidates::SourceId)
                            .to(Sources::Table, Sources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_candidates_unprocessed")
                    .table(Candidates::Table)
                    .col(Candidates::Processed)
                    .col(Candidates::IngestedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_candidates_outcome")
                    .table(Candidates::Table)
                    .col(Candidates::Outcome)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_candidates_outcome").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_candidates_unprocessed").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Candidates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Candidates {
    Table,
    Id,
    SourceId,
    ExternalId,
    SourceUrl,
    RawPayload,
    Normalized,
    Processed,
    Outcome,
    MatchedEventId,
    MatchConfidence,
    IngestedAt,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum Sources {
    Table,
    Id,
}
