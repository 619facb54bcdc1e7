//! OpenSASE Storefront Sync - cart promotion reconciliation sidecar

use anyhow::Result;
use opensase_storefront_sync::api::{router, AppState};
use opensase_storefront_sync::publish::{EventSink, NatsEventSink, NullEventSink};
use opensase_storefront_sync::session_memory::{InMemorySessionStorage, PgSessionStorage, SessionStorage};
use opensase_storefront_sync::watcher::{StorageFactory, StoreApiFactory};
use opensase_storefront_sync::{MedusaStoreClient, SessionRegistry, StoreApi, SyncConfig};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = SyncConfig::from_env()?;

    let storage_factory: StorageFactory = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(move |session: &str| Arc::new(PgSessionStorage::new(db.clone(), session)) as Arc<dyn SessionStorage>)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, session memory is kept in-process");
            Arc::new(|_: &str| Arc::new(InMemorySessionStorage::new()) as Arc<dyn SessionStorage>)
        }
    };

    let events: Arc<dyn EventSink> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsEventSink::new(client)),
            Err(e) => { tracing::warn!("NATS unavailable ({}), reconcile events are not published", e); Arc::new(NullEventSink) }
        },
        None => Arc::new(NullEventSink),
    };

    let store = MedusaStoreClient::new(&config)?;
    let api_factory: StoreApiFactory = Arc::new(move || Arc::new(store.for_session(None)) as Arc<dyn StoreApi>);
    let registry = Arc::new(SessionRegistry::new(api_factory, storage_factory, events, config.settle_delay()));

    let idle = config.session_idle();
    let sweeper = registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(idle / 4);
        loop {
            ticker.tick().await;
            let evicted = sweeper.evict_idle(idle);
            if evicted > 0 { tracing::info!(evicted, remaining = sweeper.len(), "evicted idle sessions"); }
        }
    });

    let app = router(AppState { registry });

    tracing::info!("🚀 OpenSASE Storefront Sync listening on 0.0.0.0:{} (store API {})", config.port, config.store_api_url);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
