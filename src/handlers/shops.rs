use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::{error::AppError, models::Shop, state::AppState};

pub async fn list_shops(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Shop>>, AppError> {
    Ok(Json(state.store.list_shops()?))
}

pub async fn get_shop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Shop>, AppError> {
    Ok(Json(state.store.get_shop(id)?))
}

/// Any `id` in the body is ignored; the store assigns one.
pub async fn create_shop(
    State(state): State<Arc<AppState>>,
    Json(shop): Json<Shop>,
) -> Result<Json<Shop>, AppError> {
    if shop.name.trim().is_empty() {
        return Err(AppError::BadRequest("Shop name is required".into()));
    }

    let shop = state.store.create_shop(
        shop.name.trim(),
        shop.location.trim(),
        shop.contact_number.trim(),
    )?;
    info!("Shop created: {} ({})", shop.name, shop.id);
    Ok(Json(shop))
}
