//! Migration to create the fingerprints lookup table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Fingerprints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Fingerprints::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Fingerprints::EventId).integer().not_null())
                    .col(ColumnDef::new(Fingerprints::Kind).text().not_null())
                    .col(
                        ColumnDef::new(Fingerprints::Hash)
                            .char_len(64)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fingerprints_event_id")
                            .from(Fingerprints::Table, Fingerprints::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The dedup lookup path: kind + hash -> event ids.
        manager
            .create_index(
                Index::create()
                    .name("idx_fingerprints_kind_hash")
                    .table(Fingerprints::Table)
                    .col(Fingerprints::Kind)
                    .col(Fingerprints::Hash)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fingerprints_event")
                    .table(Fingerprints::Table)
                    .col(Fingerprints::EventId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_fingerprints_event").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_fingerprints_kind_hash").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Fingerprints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Fingerprints {
    Table,
    Id,
    EventId,
    Kind,
    Hash,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
}
