//! Migration to create the reference tables.
//!
//! Regions and cities form the fixed administrative hierarchy; venues,
//! organizers, genres and artists accumulate over time as ingestion and
//! editorial work discover them.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Regions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Regions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Regions::Name).text().not_null())
                    .col(ColumnDef::new(Regions::Slug).text().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Cities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Cities::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Cities::RegionId).integer().not_null())
                    .col(ColumnDef::new(Cities::Name).text().not_null())
                    .col(ColumnDef::new(Cities::Slug).text().not_null().unique_key())
                    .col(ColumnDef::new(Cities::Latitude).double().null())
                    .col(ColumnDef::new(Cities::Longitude).double().null())
                    .col(ColumnDef::new(Cities::NameVariants).json_binary().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cities_region_id")
                            .from(Cities::Table, Cities::RegionId)
                            .to(Regions::Table, Regions::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Venues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Venues::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Venues::CityId).integer().not_null())
                    .col(ColumnDef::new(Venues::Name).text().not_null())
                    .col(ColumnDef::new(Venues::Slug).text().not_null())
                    .col(ColumnDef::new(Venues::Address).text().null())
                    .col(ColumnDef::new(Venues::Latitude).double().null())
                    .col(ColumnDef::new(Venues::Longitude).double().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_venues_city_id")
                            .from(Venues::Table, Venues::CityId)
                            .to(Cities::Table, Cities::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Organizers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Organizers::Name).text().not_null())
                    .col(ColumnDef::new(Organizers::Slug).text().not_null())
                    .col(ColumnDef::new(Organizers::Website).text().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genres::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Genres::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Genres::Name).text().not_null())
                    .col(ColumnDef::new(Genres::Slug).text().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Artists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Artists::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Artists::Name).text().not_null())
                    .col(ColumnDef::new(Artists::Slug).text().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cities_region")
                    .table(Cities::Table)
                    .col(Cities::RegionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_venues_city")
                    .table(Venues::Table)
                    .col(Venues::CityId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_venues_city").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_cities_region").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Artists::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Genres::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Venues::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Cities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Regions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Regions {
    Table,
    Id,
    Name,
    Slug,
}

#[derive(DeriveIden)]
enum Cities {
    Table,
    Id,
    RegionId,
    Name,
    Slug,
    Latitude,
    Longitude,
    NameVariants,
}

#[derive(DeriveIden)]
enum Venues {
    Table,
    Id,
    CityId,
    Name,
    Slug,
    Address,
    Latitude,
    Longitude,
}

#[derive(DeriveIden)]
enum Organizers {
    Table,
    Id,
    Name,
    Slug,
    Website,
}

#[derive(DeriveIden)]
enum Genres {
    Table,
    Id,
    Name,
    Slug,
}

#[derive(DeriveIden)]
enum Artists {
    Table,
    Id,
    Name,
    Slug,
}
