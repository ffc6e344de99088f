//! Backend of a tile marketplace.
//!
//! Sellers list tiles under shops and categories, customers browse and filter
//! them. Uploaded tile photos go through [`image::Normalizer`], which fits
//! them to a fixed box and stores them under the upload root; the returned
//! `/uploads/tiles/...` reference is kept on the tile record and served back
//! by the static file route.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod image;
pub mod models;
pub mod seed;
pub mod state;
pub mod store;

use config::Config;
use handlers::{auth as auth_routes, categories, shops, tiles};
use state::AppState;
use store::Store;

pub fn router(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(state.normalizer.root());

    Router::new()
        .route("/api/tiles", get(tiles::list_tiles).post(tiles::upload_tile))
        .route("/api/tiles/seller-upload", post(tiles::seller_upload_tile))
        .route(
            "/api/tiles/:id",
            get(tiles::get_tile)
                .put(tiles::update_tile)
                .delete(tiles::delete_tile),
        )
        .route("/api/shops", get(shops::list_shops).post(shops::create_shop))
        .route("/api/shops/:id", get(shops::get_shop))
        .route(
            "/api/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route("/api/auth/signup", post(auth_routes::signup))
        .route("/api/auth/login", post(auth_routes::login))
        .nest_service("/uploads", uploads)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .with_state(state)
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening catalog at {}", config.database);
    let store = Store::open(&config.database)?;
    let state = AppState::new(config, store);

    if state.config.seed {
        if let Err(e) = seed::seed_if_empty(&state) {
            error!("Error during seeding: {e}");
        }
    }

    let address = (state.config.bind, state.config.port);
    let app = router(state.clone());

    let listener = TcpListener::bind(address).await?;
    info!("Server running on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
