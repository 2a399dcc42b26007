use crate::config::db::DB;
use crate::config::AppConfig;
use crate::errors::{any_error, ApiError};
use crate::route::{article_api, article_page};
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::http::Uri;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use std::fs;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

pub mod config;
pub mod errors;
pub mod middleware;
pub mod model;
pub mod route;
pub mod service;
pub mod util;

// Application state shared across handlers.
// Cloning AppState is cheap, the config and the pool sit behind an Arc.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DB>,
}

// Application router creation
// Note: The order of layers is important.
pub async fn create_app(state: AppState) -> anyhow::Result<Router> {
    let config = &state.config;

    let static_route = Router::new().nest_service(
        &config.static_url,
        ServeDir::new(config.static_path.clone()).not_found_service(handle_404.into_service()),
    );

    fs::create_dir_all(&config.upload.base_path).context("Failed to create upload directory")?;

    let uploads_route = Router::new().nest_service(
        &config.upload.base_url,
        ServeDir::new(config.upload.base_path.clone()).not_found_service(handle_404.into_service()),
    );

    // https://docs.rs/axum/latest/axum/middleware/index.html#ordering
    let mut app = Router::new()
        .route("/", get(|| async { Redirect::to("/article/list") }))
        .nest("/api", article_api::create_routes(state.clone()))
        .nest("/article", article_page::create_routes(state.clone()))
        .merge(static_route)
        .merge(uploads_route)
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(DefaultBodyLimit::max(config.http.max_body_size as usize))
                .layer(config.http.cors.clone().into_layer()),
        );

    if config.log.log_requests {
        app = app.layer(TraceLayer::new_for_http());
    }
    Ok(app.with_state(state))
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = DB::new(&config.db.url, config.db.pool_size)
            .await
            .context("Cannot connect to database")?;

        Ok(AppState::from_parts(config, db))
    }

    pub fn from_parts(config: AppConfig, db: DB) -> Self {
        AppState {
            config: Arc::new(config),
            db: Arc::new(db),
        }
    }
}

pub async fn handle_404(_uri: Uri) -> ApiError {
    any_error(404, "Not Found", None)
}

async fn handle_405() -> ApiError {
    any_error(405, "Method Not Allowed", Some("The route does not accept this method"))
}

// Custom panic handler, logs the panic and returns a 500 response
fn handle_panic(panic: Box<dyn std::any::Any + Send>) -> Response {
    let panic_message = if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Unknown panic"
    };

    error!("App panicked: {}", panic_message);
    any_error(500, "Internal Server Error", None).into_response()
}
