use std::{collections::HashMap, str::FromStr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    models::{NewTile, Tile, TileFilter, TileUpdate},
    state::AppState,
    store::StoreError,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    pub shop_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTileParams {
    pub shop_id: i64,
    pub name: String,
    pub price: f64,
    pub description: String,
    pub size: String,
    pub stock: i64,
    pub category: String,
}

struct ImagePart {
    file_name: String,
    bytes: Bytes,
}

#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    image: Option<ImagePart>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "image" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                debug!("Received image part {file_name:?} ({} bytes)", bytes.len());
                form.image = Some(ImagePart { file_name, bytes });
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    fn text(&self, key: &str) -> Result<&str, AppError> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("Missing field: {key}")))
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<T, AppError> {
        self.text(key)?
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid field: {key}")))
    }

    fn price(&self) -> Result<f64, AppError> {
        let price: f64 = self.parse("price")?;
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::BadRequest("Invalid field: price".into()));
        }
        Ok(price)
    }
}

/// Tile fields collected from an upload form, before the image is stored.
struct Listing {
    name: String,
    price: f64,
    category: String,
    shop_id: i64,
    description: Option<String>,
    size: Option<String>,
    stock: Option<i64>,
}

pub async fn list_tiles(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TileFilter>,
) -> Result<Json<Vec<Tile>>, AppError> {
    let tiles = state.store.list_tiles(&filter)?;
    debug!("Listing {} tiles", tiles.len());

    Ok(Json(
        tiles.into_iter().map(|tile| state.present(tile)).collect(),
    ))
}

pub async fn get_tile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Tile>, AppError> {
    let tile = state.store.get_tile(id)?;
    Ok(Json(state.present(tile)))
}

pub async fn upload_tile(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Tile>, AppError> {
    let mut form = UploadForm::read(multipart).await?;

    let listing = Listing {
        name: form.text("name")?.to_string(),
        price: form.price()?,
        category: form.text("category")?.to_string(),
        shop_id: form.parse("shopId")?,
        description: None,
        size: None,
        stock: None,
    };
    let image = form
        .image
        .take()
        .ok_or_else(|| AppError::BadRequest("Image file is required".into()))?;

    create_tile(&state, listing, image).await
}

pub async fn seller_upload_tile(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Tile>, AppError> {
    let mut form = UploadForm::read(multipart).await?;

    let image = match form.image.take() {
        Some(image) if !image.bytes.is_empty() => image,
        _ => {
            warn!("Empty image file received");
            return Err(AppError::BadRequest("Image file is required".into()));
        }
    };

    let listing = Listing {
        name: form.text("name")?.to_string(),
        price: form.price()?,
        category: form.text("category")?.to_string(),
        shop_id: form.parse("shopId")?,
        description: Some(form.text("description")?.to_string()),
        size: Some(form.text("size")?.to_string()),
        stock: Some(form.parse("stock")?),
    };

    create_tile(&state, listing, image).await
}

async fn create_tile(
    state: &Arc<AppState>,
    listing: Listing,
    image: ImagePart,
) -> Result<Json<Tile>, AppError> {
    // Checked first so an unknown shop never leaves an image behind.
    let shop = match state.store.get_shop(listing.shop_id) {
        Ok(shop) => shop,
        Err(StoreError::NotFound(_)) => {
            warn!("Shop not found with ID: {}", listing.shop_id);
            return Err(AppError::BadRequest("Shop not found".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let normalizer = state.normalizer.clone();
    let stored = tokio::task::spawn_blocking(move || {
        normalizer.normalize(&image.bytes, &image.file_name)
    })
    .await
    .map_err(AppError::internal)??;
    info!("Image path stored: {}", stored.path);

    let saved = state
        .store
        .find_or_create_category(&listing.category)
        .and_then(|category| {
            state.store.insert_tile(&NewTile {
                name: listing.name,
                price: listing.price,
                description: listing.description,
                image_path: Some(stored.path.clone()),
                size: listing.size,
                stock: listing.stock,
                category_id: Some(category.id),
                shop_id: Some(shop.id),
            })
        });

    match saved {
        Ok(tile) => {
            info!("Tile saved successfully: {} with path: {}", tile.id, stored.path);
            Ok(Json(state.present(tile)))
        }
        Err(e) => {
            // No record points at the file, so it must not outlive this request.
            if let Err(cleanup) = state.normalizer.remove(&stored.path) {
                warn!("Failed to remove orphaned image {}: {cleanup}", stored.path);
            }
            Err(e.into())
        }
    }
}

pub async fn update_tile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<UpdateTileParams>,
) -> Result<Json<Tile>, AppError> {
    let tile = state.store.get_tile(id)?;

    if !tile.is_owned_by(params.shop_id) {
        warn!(
            "Unauthorized update attempt: shopId {} tried to update tile {id}",
            params.shop_id
        );
        return Err(AppError::Forbidden("You can only edit your own tiles"));
    }

    let category_name = params.category.trim();
    if category_name.is_empty() {
        return Err(AppError::BadRequest("Missing field: category".into()));
    }
    let category = state.store.find_or_create_category(category_name)?;

    let updated = state.store.update_tile(
        id,
        &TileUpdate {
            name: params.name,
            price: params.price,
            description: params.description,
            size: params.size,
            stock: params.stock,
            category_id: category.id,
        },
    )?;

    info!("Tile updated: {id}");
    Ok(Json(state.present(updated)))
}

pub async fn delete_tile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(owner): Query<OwnerQuery>,
) -> Result<&'static str, AppError> {
    let tile = state.store.get_tile(id)?;

    if !tile.is_owned_by(owner.shop_id) {
        warn!(
            "Unauthorized delete attempt: shopId {} tried to delete tile {id}",
            owner.shop_id
        );
        return Err(AppError::Forbidden("You can only delete your own tiles"));
    }

    // Record first: a reference must never point at a removed file.
    state.store.delete_tile(id)?;

    if let Some(path) = tile.image_path.as_deref() {
        match state.normalizer.remove(path) {
            Ok(true) => {}
            Ok(false) => debug!("Image {path} was already gone"),
            Err(e) => warn!("Could not delete image {path}: {e}"),
        }
    }

    info!("Tile deleted: {id}");
    Ok("Tile deleted successfully")
}
