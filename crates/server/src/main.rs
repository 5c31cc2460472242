use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit, middleware as axum_middleware, routing::get, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod routes;
mod services;
#[cfg(test)]
mod testing;

use handlers::ws::ProjectHub;
use services::{
    lyrics::LyricsClient,
    mailer::{self, Mailer},
    storage::{BlobStore, LocalBlobStore, MAX_UPLOAD_BYTES},
    survey,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    // Uploaded files live on local disk and are served under /uploads
    let blobs = LocalBlobStore::new(&config.storage_path, &config.public_base_url);
    blobs.init().await?;

    // Initialize database
    let db = db::Database::connect(&config.database_url).await?;
    db.run_migrations().await?;
    routes::auth::bootstrap_admin(&db, &config).await?;

    let lyrics = config.gemini_api_key.clone().map(LyricsClient::new);
    if lyrics.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; lyrics generation is disabled");
    }

    // Build application state
    let state = AppState {
        db,
        mailer: mailer::from_config(&config.mail),
        blobs: Arc::new(blobs),
        hub: ProjectHub::new(),
        lyrics,
        config: config.clone(),
    };

    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/bookings", routes::bookings::router())
        .nest("/projects", routes::projects::router())
        .nest("/surveys", routes::surveys::router())
        .nest("/employees", routes::employees::router())
        .nest("/expenses", routes::expenses::router())
        .nest("/reports", routes::reports::router())
        .nest("/deliveries", routes::deliveries::router())
        .nest("/logs", routes::logs::router())
        .nest("/forms", routes::forms::router())
        .nest("/availability", routes::availability::router())
        .nest("/generate-lyrics", routes::lyrics::router());

    // Bearer tokens are optional at this layer; handlers that need a caller
    // extract `AuthUser`
    let authenticated = Router::new()
        .nest("/api", api_router)
        .route("/ws/projects/:id", get(handlers::ws::ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(authenticated)
        .nest_service("/uploads", ServeDir::new(&config.storage_path))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let sweeper = survey::spawn_scheduler(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    sweeper.abort();
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub mailer: Arc<dyn Mailer>,
    pub blobs: Arc<dyn BlobStore>,
    pub hub: ProjectHub,
    pub lyrics: Option<LyricsClient>,
}
