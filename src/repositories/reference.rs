//! Reference data access: the city matcher snapshot and find-or-create
//! helpers for the accumulating reference entities.

use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::error::RepositoryError;
use crate::models::{artist, city, genre, organizer, venue};
use crate::normalize::{slugify, CityMatcher, CityRef};

pub struct ReferenceRepository;

impl ReferenceRepository {
    /// Build a fresh city matcher from the canonical table. The pipeline
    /// rebuilds this at the start of every run rather than caching it.
    pub async fn load_city_matcher<C: ConnectionTrait>(
        db: &C,
    ) -> Result<CityMatcher, RepositoryError> {
        let cities = city::Entity::find().all(db).await?;
        let entries = cities
            .into_iter()
            .map(|model| {
                let variants = model.variants();
                (
                    CityRef {
                        id: model.id,
                        region_id: model.region_id,
                        name: model.name,
                        slug: model.slug,
                        latitude: model.latitude,
                        longitude: model.longitude,
                    },
                    variants,
                )
            })
            .collect();
        Ok(CityMatcher::new(entries))
    }

    pub async fn find_or_create_genre<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<genre::Model, RepositoryError> {
        let slug = slugify(name);
        if let Some(existing) = genre::Entity::find()
            .filter(genre::Column::Slug.eq(&slug))
            .one(db)
            .await?
        {
            return Ok(existing);
        }
        let model = genre::ActiveModel {
            name: Set(name.trim().to_string()),
            slug: Set(slug),
            ..Default::default()
        };
        Ok(model.insert(db).await?)
    }

    pub async fn find_or_create_artist<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<artist::Model, RepositoryError> {
        let slug = slugify(name);
        if let Some(existing) = artist::Entity::find()
            .filter(artist::Column::Slug.eq(&slug))
            .one(db)
            .await?
        {
            return Ok(existing);
        }
        let model = artist::ActiveModel {
            name: Set(name.trim().to_string()),
            slug: Set(slug),
            ..Default::default()
        };
        Ok(model.insert(db).await?)
    }

    /// Venues are scoped to a city: "Scène de la Plage" in Essaouira and in
    /// Agadir are different rows.
    pub async fn find_or_create_venue<C: ConnectionTrait>(
        db: &C,
        city_id: i32,
        name: &str,
    ) -> Result<venue::Model, RepositoryError> {
        let slug = slugify(name);
        if let Some(existing) = venue::Entity::find()
            .filter(venue::Column::CityId.eq(city_id))
            .filter(venue::Column::Slug.eq(&slug))
            .one(db)
            .await?
        {
            return Ok(existing);
        }
        let model = venue::ActiveModel {
            city_id: Set(city_id),
            name: Set(name.trim().to_string()),
            slug: Set(slug),
            address: Set(None),
            latitude: Set(None),
            longitude: Set(None),
            ..Default::default()
        };
        Ok(model.insert(db).await?)
    }

    pub async fn find_or_create_organizer<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<organizer::Model, RepositoryError> {
        let slug = slugify(name);
        if let Some(existing) = organizer::Entity::find()
            .filter(organizer::Column::Slug.eq(&slug))
            .one(db)
            .await?
        {
            return Ok(existing);
        }
        let model = organizer::ActiveModel {
            name: Set(name.trim().to_string()),
            slug: Set(slug),
            website: Set(None),
            ..Default::default()
        };
        Ok(model.insert(db).await?)
    }
}
