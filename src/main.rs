mod api;
mod config;
mod db;
mod error;
mod signing;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::ServerConfig;
use signing::{DbTokenStore, MemoryTokenStore, TokenStore};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claim_signing_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let store: Arc<dyn TokenStore> = if config.in_memory {
        tracing::warn!("Using in-memory token store; tokens are lost on restart");
        Arc::new(MemoryTokenStore::with_validity(config.token_ttl))
    } else {
        // Initialize database
        let db = db::init_database(&config.db_path)
            .await
            .expect("Failed to initialize database");
        tracing::info!("Database initialized at {:?}", config.db_path);
        Arc::new(DbTokenStore::with_validity(Arc::new(db), config.token_ttl))
    };
    tracing::info!(
        "Signature tokens valid for {} hours",
        config.token_ttl.as_secs() / 3600
    );

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, store));

    let app = api::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Claim signing server starting on http://{}", addr);
    tracing::info!("  POST /api/signatures          - Issue a signature token");
    tracing::info!("  GET  /sign/:token             - Signer link");
    tracing::info!("  POST /webhooks/form-provider  - Provider submission callback");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
