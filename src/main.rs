use std::sync::Arc;

use chat_service::blob::{BlobStore, MemoryBlobStore, S3BlobStore};
use chat_service::config::Config;
use chat_service::db;
use chat_service::error::AppError;
use chat_service::logging;
use chat_service::realtime::{propagator, pubsub, ConnectionRegistry};
use chat_service::routes::build_router;
use chat_service::state::AppState;
use chat_service::store::postgres::PgStore;
use chat_service::store::ChatStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();

    let config = Config::from_env()?;

    let pool = db::init_pool(&config.database_url).await?;
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::Startup(format!("migration failed: {e}")))?;

    let redis_client = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())
                .map_err(|e| AppError::Config(format!("invalid REDIS_URL: {e}")))?;
            tracing::info!("redis pub/sub enabled");
            Some(client)
        }
        None => {
            tracing::info!("no REDIS_URL, change propagation is single-instance");
            None
        }
    };

    let store: Arc<dyn ChatStore> = Arc::new(PgStore::new(pool, redis_client.clone()));

    let blobs: Arc<dyn BlobStore> = match &config.blob {
        Some(blob_config) => {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let client = aws_sdk_s3::Client::new(&aws_config);
            Arc::new(S3BlobStore::new(client, blob_config))
        }
        None => {
            tracing::warn!("no BLOB_BUCKET, media uploads are held in memory");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let registry = ConnectionRegistry::new();

    tokio::spawn(propagator::run(store.changes(), registry.clone()));
    if let Some(client) = redis_client {
        let listener_registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = pubsub::start_psub_listener(client, listener_registry).await {
                tracing::error!(error = %e, "redis listener exited");
            }
        });
    }

    let state = AppState {
        store,
        blobs,
        registry,
        config: Arc::new(config.clone()),
    };

    let app = build_router().with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Startup(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "chat-service listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Startup(e.to_string()))?;
    Ok(())
}
