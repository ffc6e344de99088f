use std::sync::Arc;

use crate::{config::Config, image::Normalizer, models::Tile, store::Store};

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub normalizer: Normalizer,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Arc<Self> {
        let normalizer = Normalizer::new(config.upload_dir.clone(), config.image_box)
            .with_max_pixels(config.max_image_pixels);

        Arc::new(Self {
            config,
            store,
            normalizer,
        })
    }

    /// Fill in the public image URL before a tile leaves the server.
    pub fn present(&self, mut tile: Tile) -> Tile {
        tile.image_url = tile
            .image_path
            .as_deref()
            .and_then(|path| self.config.public_url_for(path));
        tile
    }
}
