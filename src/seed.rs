//! Demo catalog inserted into an empty database.

use tracing::info;

use crate::{error::AppError, models::NewTile, state::AppState};

const CATEGORIES: [&str; 4] = ["Floor Tiles", "Wall Tiles", "Bathroom Tiles", "Kitchen Tiles"];

const SHOPS: [(&str, &str, &str); 2] = [
    ("Sai Tiles Center", "Chennai", "9876543210"),
    ("Varsha Ceramics", "Coimbatore", "9123456780"),
];

struct DemoTile {
    name: &'static str,
    price: f64,
    image: &'static str,
    color: [u8; 3],
    shop: usize,
    category: usize,
}

const TILES: [DemoTile; 4] = [
    DemoTile {
        name: "Glossy White Floor",
        price: 450.0,
        image: "white_floor.jpg",
        color: [240, 240, 236],
        shop: 0,
        category: 0,
    },
    DemoTile {
        name: "Matte Black Wall",
        price: 520.0,
        image: "black_wall.jpg",
        color: [28, 28, 30],
        shop: 0,
        category: 1,
    },
    DemoTile {
        name: "Blue Bathroom Tile",
        price: 300.0,
        image: "blue_bath.jpg",
        color: [52, 110, 190],
        shop: 1,
        category: 2,
    },
    DemoTile {
        name: "Marble Kitchen Tile",
        price: 600.0,
        image: "marble_kitchen.jpg",
        color: [214, 208, 198],
        shop: 1,
        category: 3,
    },
];

/// Returns `false` without touching anything when tiles already exist.
/// Demo shops and categories are matched by name, so seeding again after
/// every tile was deleted reuses them.
pub fn seed_if_empty(state: &AppState) -> Result<bool, AppError> {
    if state.store.count_tiles()? > 0 {
        info!("Tiles already present, skipping seeding");
        return Ok(false);
    }

    let categories = CATEGORIES
        .iter()
        .map(|name| state.store.find_or_create_category(name))
        .collect::<Result<Vec<_>, _>>()?;
    let shops = SHOPS
        .iter()
        .map(|(name, location, contact)| state.store.find_or_create_shop(name, location, contact))
        .collect::<Result<Vec<_>, _>>()?;

    for demo in &TILES {
        // Every stored reference gets a real file behind it.
        let image_path = state.normalizer.placeholder(demo.image, demo.color)?;
        state.store.insert_tile(&NewTile {
            name: demo.name.to_string(),
            price: demo.price,
            image_path: Some(image_path),
            category_id: Some(categories[demo.category].id),
            shop_id: Some(shops[demo.shop].id),
            ..Default::default()
        })?;
    }

    info!(
        "Inserted {} categories, {} shops and {} tiles",
        categories.len(),
        shops.len(),
        TILES.len()
    );
    Ok(true)
}
