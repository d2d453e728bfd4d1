mod config;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use msgly_api::state::AppStateInner;
use msgly_api::tokens::TokenIssuer;
use msgly_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "msgly=debug,msgly_api=debug,msgly_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path, config.db_busy_timeout)?;

    // The signing key is fixed for the life of the process
    let tokens = TokenIssuer::new(config.jwt_secret.as_bytes(), config.token_ttl);
    let state = AppStateInner::new(db, tokens);

    let app = msgly_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!(
        "msgly server listening on {} (tokens valid for {}h)",
        config.addr,
        config.token_ttl.num_hours()
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
