use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use tilesmart::config::Config;

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = tilesmart::start_server(config).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
