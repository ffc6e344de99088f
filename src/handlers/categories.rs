use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use crate::{error::AppError, models::Category, state::AppState};

#[derive(Deserialize)]
pub struct NewCategory {
    pub name: String,
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.store.list_categories()?))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewCategory>,
) -> Result<Json<Category>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Category name is required".into()));
    }

    let category = state.store.create_category(name)?;
    info!("Category created: {} ({})", category.name, category.id);
    Ok(Json(category))
}
