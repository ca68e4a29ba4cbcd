use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod handlers;

use handlers::{health, predict};
use tyrecast::assets::{self, AssetConfig};

/// Application state shared across handlers
pub struct AppState {
    pub asset_config: AssetConfig,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{}:{}", host, port);

    let asset_config = AssetConfig::from_env();
    info!("Loading model assets from {:?}", asset_config.dir);

    // Warm up the shared asset holder; a failure here is not fatal, the
    // load is retried on the first request
    match assets::shared(&asset_config) {
        Ok(_) => info!("Model assets loaded successfully"),
        Err(e) => warn!("Failed to load model assets: {}. Retrying on first request.", e),
    }

    let app_state = Arc::new(AppState { asset_config });

    info!("Starting Tyrecast API server at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/predict", web::post().to(predict::predict_compound))
    })
    .bind(&addr)?
    .run()
    .await
}
