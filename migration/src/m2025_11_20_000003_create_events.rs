//! Migration to create the events table and its genre/artist join tables.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::Slug).text().not_null())
                    .col(ColumnDef::new(Events::Name).text().not_null())
                    .col(ColumnDef::new(Events::EventType).text().not_null())
                    .col(ColumnDef::new(Events::Description).text().null())
                    .col(ColumnDef::new(Events::StartDate).date().not_null())
                    .col(ColumnDef::new(Events::EndDate).date().null())
                    .col(ColumnDef::new(Events::CityId).integer().not_null())
                    .col(ColumnDef::new(Events::RegionId).integer().not_null())
                    .col(ColumnDef::new(Events::VenueId).integer().null())
                    .col(ColumnDef::new(Events::OrganizerId).integer().null())
                    .col(ColumnDef::new(Events::OfficialWebsite).text().null())
                    .col(ColumnDef::new(Events::TicketUrl).text().null())
                    .col(
                        ColumnDef::new(Events::Status)
                            .text()
                            .not_null()
                            .default("announced"),
                    )
                    .col(
                        ColumnDef::new(Events::IsVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Events::IsPinned)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Events::CulturalSignificance)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Events::ConfidenceScore)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Events::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Events::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Events::LastVerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_city_id")
                            .from(Events::Table, Events::CityId)
                            .to(Cities::Table, Cities::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_region_id")
                            .from(Events::Table, Events::RegionId)
                            .to(Regions::Table, Regions::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Slug uniqueness applies only to non-archived events.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_events_slug_live ON events (slug) WHERE status != 'archived'"
                    .to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_status_start")
                    .table(Events::Table)
                    .col(Events::Status)
                    .col(Events::StartDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_city_start")
                    .table(Events::Table)
                    .col(Events::CityId)
                    .col(Events::StartDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventGenres::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EventGenres::EventId).integer().not_null())
                    .col(ColumnDef::new(EventGenres::GenreId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(EventGenres::EventId)
                            .col(EventGenres::GenreId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_genres_event_id")
                            .from(EventGenres::Table, EventGenres::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_genres_genre_id")
                            .from(EventGenres::Table, EventGenres::GenreId)
                            .to(Genres::Table, Genres::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventArtists::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EventArtists::EventId).integer().not_null())
                    .col(ColumnDef::new(EventArtists::ArtistId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(EventArtists::EventId)
                            .col(EventArtists::ArtistId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_artists_event_id")
                            .from(EventArtists::Table, EventArtists::EventId)
                            .to(Events::Table, Events::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_artists_artist_id")
                            .from(EventArtists::Table, EventArtists::ArtistId)
                            .to(Artists::Table, Artists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventArtists::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventGenres::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_events_city_start").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_events_status_start").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_events_slug_live").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    Slug,
    Name,
    EventType,
    Description,
    StartDate,
    EndDate,
    CityId,
    RegionId,
    VenueId,
    OrganizerId,
    OfficialWebsite,
    TicketUrl,
    Status,
    IsVerified,
    IsPinned,
    CulturalSignificance,
    ConfidenceScore,
    CreatedAt,
    UpdatedAt,
    LastVerifiedAt,
}

#[derive(DeriveIden)]
enum EventGenres {
    Table,
    EventId,
    GenreId,
}

#[derive(DeriveIden)]
enum EventArtists {
    Table,
    EventId,
    ArtistId,
}

#[derive(DeriveIden)]
enum Cities {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Regions {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Genres {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Artists {
    Table,
    Id,
}
