use std::sync::Arc;

use auth_api::config::{environment::Config, init_db};
use auth_api::modules::auth::store::SqlUserStore;
use auth_api::services::jwt::{TokenConfig, TokenService};
use auth_api::services::totp::TotpService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load environment configuration");
    let expose_errors = config.expose_errors();
    let server_port = config.server_port;

    let db = init_db(&config.database_url).await;
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Connected to MySQL");

    let store = Arc::new(SqlUserStore::new(db));
    let tokens = TokenService::new(TokenConfig::new(
        config.jwt_secret,
        config.jwt_refresh_secret,
    ));
    let totp = TotpService::new(config.totp_issuer);

    let app = auth_api::create_app(store, tokens, totp, expose_errors).await;

    let addr = format!("0.0.0.0:{}", server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!("Server running on http://localhost:{}", server_port);
    axum::serve(listener, app).await.unwrap();
}
