//! Waystone synchronization service entry point.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use waystone_cache::{CacheConfig, InMemoryBackend, StateCache};
use waystone_core::bus::MessageBus;
use waystone_core::clock::{Clock, SystemClock};
use waystone_core::repository::SyncRepository;
use waystone_protocol::{RetryPolicy, SyncContext};
use waystone_publish::{EventPublicationManager, PublisherConfig};
use waystone_resolve::ConflictResolver;
use waystone_store::PgSyncRepository;

mod bus;
mod consumer;

fn env_duration_ms(name: &str, default: Duration) -> Result<Duration, Box<dyn Error>> {
    match std::env::var(name) {
        Ok(raw) => {
            let millis: u64 = raw
                .parse()
                .map_err(|e| format!("{name} must be an integer millisecond count: {e}"))?;
            Ok(Duration::from_millis(millis))
        }
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Waystone synchronization service");

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;
    let batch_size: usize = std::env::var("PUBLISH_BATCH_SIZE")
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .map_err(|e| format!("PUBLISH_BATCH_SIZE must be a valid usize: {e}"))?;
    let publisher_config = PublisherConfig {
        batch_size,
        batch_timeout: env_duration_ms("PUBLISH_BATCH_TIMEOUT_MS", Duration::from_millis(500))?,
        ..PublisherConfig::default()
    };

    // Create database connection pool and apply migrations.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Wire the synchronization pipeline. The in-memory cache backend
    // serves single-instance deployments; swap the backend to share a
    // cache across instances.
    let repository: Arc<dyn SyncRepository> = Arc::new(PgSyncRepository::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let topic_bus = Arc::new(bus::InProcessBus::new());
    let message_bus: Arc<dyn MessageBus> = topic_bus.clone();
    let cache = Arc::new(StateCache::new(
        Arc::new(InMemoryBackend::new()),
        CacheConfig::default(),
    ));
    let resolver = Arc::new(ConflictResolver::new(
        Arc::clone(&cache),
        Arc::clone(&repository),
        Arc::clone(&clock),
    ));
    let publisher = Arc::new(EventPublicationManager::new(
        Arc::clone(&message_bus),
        Arc::clone(&clock),
        publisher_config,
    ));

    let mut consumers = consumer::TopicConsumers::bind(&topic_bus);
    let ctx = SyncContext {
        cache,
        resolver,
        repository,
        bus: message_bus,
        publisher: Arc::clone(&publisher),
        clock,
        retry: RetryPolicy::default(),
    };

    publisher.start();
    tracing::info!("Consuming synchronization topics");

    tokio::select! {
        () = consumer::run(&ctx, &mut consumers) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown signal received");
        }
    }

    // Stop without draining: queued messages persist for the next run.
    publisher.stop().await;

    Ok(())
}
