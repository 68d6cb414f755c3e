use std::future::Future;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

mod api;
mod auth;
mod config;
mod db;
mod entities;
mod error;
mod services;

use config::AppConfig;
use error::ApiError;
use services::analytics::ThreatPatterns;

/// Shared handle every handler receives. Services are constructor-injected
/// here; there are no module-level singletons.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub threat_patterns: Arc<ThreatPatterns>,
}

impl AppState {
    /// Runs a core operation under the configured deadline. On expiry the
    /// caller gets a Timeout error and no partial result.
    pub async fn with_deadline<T>(
        &self,
        operation: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        match tokio::time::timeout(self.config.request_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        }
    }
}

fn router(state: AppState) -> Router {
    // everything except the health probe sits behind the api-key gate
    let protected = Router::new()
        .route(
            "/logs",
            post(api::ingest::ingest_logs).get(api::ingest::list_logs),
        )
        .route(
            "/api/logs",
            post(api::ingest::ingest_logs).get(api::ingest::list_logs),
        )
        .route("/clients", get(api::clients::list_clients))
        .route("/dashboard", get(api::dashboard::get_dashboard))
        .route("/threats", get(api::threats::get_threats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(api::health::health_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = AppConfig::from_env()?;

    let db = match db::connect(&config.database_url).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!("failed to connect to database: {err}");
            std::process::exit(1);
        }
    };

    let bind_addr = config.bind_addr;
    let state = AppState {
        db,
        config: Arc::new(config),
        threat_patterns: Arc::new(ThreatPatterns::new()),
    };

    let app = router(state);

    tracing::info!("listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
