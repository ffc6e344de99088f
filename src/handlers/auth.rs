use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::{hash_password, issue_token, verify_password},
    error::AppError,
    models::{NewUser, Role},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// "CUSTOMER" or "SELLER"; anything else signs up a customer.
    pub user_type: Option<String>,
    pub shop_name: Option<String>,
    pub shop_location: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub role: Role,
    pub user_id: i64,
    pub shop_id: Option<i64>,
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

fn optional(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<&'static str, AppError> {
    let name = required(&req.name, "Name is required")?;
    let email = required(&req.email, "Email is required")?;
    // Checked for blankness, hashed as given.
    required(&req.password, "Password is required")?;
    let password = req.password.as_deref().unwrap_or_default();

    if state.store.find_user_by_email(email)?.is_some() {
        return Err(AppError::BadRequest("Email already exists".into()));
    }

    let role = req
        .user_type
        .as_deref()
        .and_then(|t| t.parse::<Role>().ok())
        .filter(|role| *role == Role::Seller)
        .unwrap_or(Role::Customer);

    let shop = match role {
        Role::Seller => Some((
            required(&req.shop_name, "Shop name is required for sellers")?,
            optional(&req.shop_location),
            optional(&req.contact_number),
        )),
        Role::Customer => None,
    };

    let user = NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password),
        role,
    };

    // Lost a race with another signup for the same address.
    let user = state.store.register_user(&user, shop).map_err(|e| match AppError::from(e) {
        AppError::Conflict(message) => AppError::BadRequest(message),
        other => other,
    })?;

    info!("User signup successful: {} with role: {}", user.email, user.role);
    Ok("Signup successful")
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let Some(user) = state.store.find_user_by_email(req.email.trim())? else {
        warn!("Login attempt for unknown email");
        return Err(AppError::Unauthorized);
    };

    if !verify_password(&req.password, &user.password_hash) {
        warn!("Failed login for user {}", user.id);
        return Err(AppError::Unauthorized);
    }

    info!("User {} logged in as {}", user.id, user.role);
    Ok(Json(AuthResponse {
        token: issue_token(),
        role: user.role,
        user_id: user.id,
        shop_id: user.shop_id,
    }))
}
