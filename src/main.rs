//! Entry point: load config, wire dependencies, and run the server.

use chillhub::auth::JwtSecret;
use chillhub::config::Config;
use chillhub::db::{self, PgStore};
use chillhub::repositories::RedisRepository;
use chillhub::{create_app, AppState, Hub};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = db::create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    let presence_store = Arc::new(RedisRepository::new(&config.redis_url)?);
    let hub = Hub::new(
        store.clone(),
        presence_store,
        store.clone(),
        config.presence_scope,
    );

    let state = AppState {
        hub,
        db: db_pool,
        jwt_secret: JwtSecret::new(config.jwt_secret.clone(), config.jwt_ttl_days),
        directory: store,
    };

    let app = create_app(state, &config.allowed_origins);

    tracing::info!(addr = %config.server_addr, scope = ?config.presence_scope, "listening");
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
