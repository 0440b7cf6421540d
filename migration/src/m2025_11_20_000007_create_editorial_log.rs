//! Migration to create the editorial audit log and event snapshot tables.
//!
//! Both tables are append-only. Snapshots preserve the losing side of an
//! editorial merge before its row is removed.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EditorialActions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EditorialActions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EditorialActions::ActionType)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EditorialActions::EventId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EditorialActions::Actor).text().not_null())
                    .col(
                        ColumnDef::new(EditorialActions::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EditorialActions::CreatedAt)
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
                    .name("idx_editorial_actions_event")
                    .table(EditorialActions::Table)
                    .col(EditorialActions::EventId)
                    .col(EditorialActions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EventSnapshots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EventSnapshots::EventId).integer().not_null())
                    .col(
                        ColumnDef::new(EventSnapshots::Snapshot)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EventSnapshots::Reason).text().not_null())
                    .col(
                        ColumnDef::new(EventSnapshots::CreatedAt)
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
                    .name("idx_event_snapshots_event")
                    .table(EventSnapshots::Table)
                    .col(EventSnapshots::EventId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_event_snapshots_event").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventSnapshots::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_editorial_actions_event")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(EditorialActions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EditorialActions {
    Table,
    Id,
    ActionType,
    EventId,
    Actor,
    Payload,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EventSnapshots {
    Table,
    Id,
    EventId,
    Snapshot,
    Reason,
    CreatedAt,
}
