use axum::routing::{delete, get};
use axum::Router;
use axum::{response::Json, middleware::from_fn};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use networth_api::error::ApiError;
use networth_api::middleware::{auth_middleware, cors_layer, preflight_no_content};
use networth_api::{config, handlers};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, AUTH_* etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::config();
    tracing::info!("Starting Networth API in {:?} mode", config.environment);

    let app = app();

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    println!("🚀 Networth API server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    // Everything except /health sits behind the bearer-token check
    let protected = Router::new()
        .route("/me", get(handlers::me_get))
        .route(
            "/snapshots",
            get(handlers::snapshots_get).post(handlers::snapshots_post),
        )
        .route("/snapshots/:date", delete(handlers::snapshots_delete))
        .layer(from_fn(auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .fallback(not_found)
        // Global middleware; the preflight rewrite wraps the CORS layer
        .layer(cors_layer(&config::config().security.cors_origins))
        .layer(from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
