pub mod config;
pub mod modules;
pub mod services;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use modules::auth::auth_routes;
use modules::auth::service::AuthService;
use modules::auth::store::UserStore;
use services::jwt::TokenService;
use services::rate_limit::{create_rate_limiter, RateLimitLayer};
use services::security::security_headers;
use services::totp::TotpService;

pub struct AppState {
    pub auth: AuthService,
    pub tokens: Arc<TokenService>,
    pub expose_errors: bool,
}

pub async fn create_app(
    store: Arc<dyn UserStore>,
    tokens: TokenService,
    totp: TotpService,
    expose_errors: bool,
) -> Router {
    let tokens = Arc::new(tokens);
    let state = Arc::new(AppState {
        auth: AuthService::new(store, tokens.clone(), totp),
        tokens,
        expose_errors,
    });

    // 60 sustained requests per minute with a burst allowance of 30
    let rate_limiter = create_rate_limiter(60, 30);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/auth", auth_routes())
        .layer(middleware::from_fn(security_headers))
        .layer(RequestBodyLimitLayer::new(1024 * 100)) // 100KB max body
        .layer(RateLimitLayer::new(rate_limiter))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Authentication API"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
