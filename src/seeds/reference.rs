//! Reference data seeds: the administrative hierarchy the city matcher
//! works against. Seeding is idempotent: it only runs against an empty
//! cities table.

use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::json;
use tracing::info;

use crate::error::RepositoryError;
use crate::models::{city, region};
use crate::normalize::slugify;

struct CitySeed {
    name: &'static str,
    region: &'static str,
    latitude: f64,
    longitude: f64,
    variants: &'static [&'static str],
}

const REGIONS: &[&str] = &[
    "Tanger-Tétouan-Al Hoceïma",
    "L'Oriental",
    "Fès-Meknès",
    "Rabat-Salé-Kénitra",
    "Béni Mellal-Khénifra",
    "Casablanca-Settat",
    "Marrakech-Safi",
    "Drâa-Tafilalet",
    "Souss-Massa",
    "Guelmim-Oued Noun",
    "Laâyoune-Sakia El Hamra",
    "Dakhla-Oued Ed-Dahab",
];

const CITIES: &[CitySeed] = &[
    CitySeed {
        name: "Tanger",
        region: "Tanger-Tétouan-Al Hoceïma",
        latitude: 35.7595,
        longitude: -5.834,
        variants: &["Tangier", "Tangiers"],
    },
    CitySeed {
        name: "Tétouan",
        region: "Tanger-Tétouan-Al Hoceïma",
        latitude: 35.5889,
        longitude: -5.3626,
        variants: &["Tetouan"],
    },
    CitySeed {
        name: "Chefchaouen",
        region: "Tanger-Tétouan-Al Hoceïma",
        latitude: 35.1688,
        longitude: -5.2636,
        variants: &["Chaouen"],
    },
    CitySeed {
        name: "Oujda",
        region: "L'Oriental",
        latitude: 34.6814,
        longitude: -1.9086,
        variants: &[],
    },
    CitySeed {
        name: "Fès",
        region: "Fès-Meknès",
        latitude: 34.0331,
        longitude: -5.0003,
        variants: &["Fez", "Fes"],
    },
    CitySeed {
        name: "Meknès",
        region: "Fès-Meknès",
        latitude: 33.8935,
        longitude: -5.5473,
        variants: &["Meknes"],
    },
    CitySeed {
        name: "Rabat",
        region: "Rabat-Salé-Kénitra",
        latitude: 34.0209,
        longitude: -6.8416,
        variants: &[],
    },
    CitySeed {
        name: "Salé",
        region: "Rabat-Salé-Kénitra",
        latitude: 34.0531,
        longitude: -6.7985,
        variants: &["Sale"],
    },
    CitySeed {
        name: "Casablanca",
        region: "Casablanca-Settat",
        latitude: 33.5731,
        longitude: -7.5898,
        variants: &["Casa", "Dar el Beida"],
    },
    CitySeed {
        name: "El Jadida",
        region: "Casablanca-Settat",
        latitude: 33.2316,
        longitude: -8.5007,
        variants: &["Mazagan"],
    },
    CitySeed {
        name: "Marrakech",
        region: "Marrakech-Safi",
        latitude: 31.6295,
        longitude: -7.9811,
        variants: &["Marrakesh"],
    },
    CitySeed {
        name: "Essaouira",
        region: "Marrakech-Safi",
        latitude: 31.5085,
        longitude: -9.7595,
        variants: &["Mogador"],
    },
    CitySeed {
        name: "Ouarzazate",
        region: "Drâa-Tafilalet",
        latitude: 30.9335,
        longitude: -6.937,
        variants: &[],
    },
    CitySeed {
        name: "Merzouga",
        region: "Drâa-Tafilalet",
        latitude: 31.0802,
        longitude: -4.0135,
        variants: &[],
    },
    CitySeed {
        name: "Agadir",
        region: "Souss-Massa",
        latitude: 30.4278,
        longitude: -9.5981,
        variants: &[],
    },
    CitySeed {
        name: "Guelmim",
        region: "Guelmim-Oued Noun",
        latitude: 28.987,
        longitude: -10.0574,
        variants: &["Goulimine"],
    },
    CitySeed {
        name: "Laâyoune",
        region: "Laâyoune-Sakia El Hamra",
        latitude: 27.1536,
        longitude: -13.2033,
        variants: &["Laayoune"],
    },
    CitySeed {
        name: "Dakhla",
        region: "Dakhla-Oued Ed-Dahab",
        latitude: 23.6848,
        longitude: -15.958,
        variants: &[],
    },
];

/// Seed regions and cities when the cities table is empty.
pub async fn seed_reference_data<C: ConnectionTrait>(db: &C) -> Result<(), RepositoryError> {
    let existing = city::Entity::find().count(db).await?;
    if existing > 0 {
        return Ok(());
    }

    let mut region_ids = std::collections::HashMap::new();
    for name in REGIONS {
        let inserted = region::ActiveModel {
            name: Set(name.to_string()),
            slug: Set(slugify(name)),
            ..Default::default()
        }
        .insert(db)
        .await?;
        region_ids.insert(*name, inserted.id);
    }

    for seed in CITIES {
        let region_id = region_ids
            .get(seed.region)
            .copied()
            .expect("every seeded city references a seeded region");
        city::ActiveModel {
            region_id: Set(region_id),
            name: Set(seed.name.to_string()),
            slug: Set(slugify(seed.name)),
            latitude: Set(Some(seed.latitude)),
            longitude: Set(Some(seed.longitude)),
            name_variants: Set(if seed.variants.is_empty() {
                None
            } else {
                Some(json!(seed.variants))
            }),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    info!(
        regions = REGIONS.len(),
        cities = CITIES.len(),
        "seeded reference data"
    );
    Ok(())
}
