//! The `carousel-engine` binary: connects to Postgres and Redis, recovers
//! crashed state, and runs the scheduler tick loop until signaled to stop.

use std::sync::Arc;
use std::time::Duration;

use carousel_core::PolicyKind;
use carousel_engine::{Engine, EngineConfig};
use carousel_store_postgres::PgJobStore;
use carousel_transport_redis::RedisTransport;
use clap::Parser;

/// Flags exist mainly for local overrides and `--help`; in normal
/// operation every one of these is set via environment variable.
#[derive(Parser, Debug)]
#[command(name = "carousel-engine", about = "Carousel scheduler engine")]
struct Args {
    #[arg(long, env = "STORE_URL")]
    store_url: String,

    #[arg(long, env = "TRANSPORT_URL")]
    transport_url: String,

    #[arg(long, env = "ENGINE_TICK_MS", default_value_t = 100)]
    engine_tick_ms: u64,

    #[arg(long, env = "ENGINE_CLAIM_BATCH", default_value_t = 100)]
    engine_claim_batch: u32,

    #[arg(long, env = "DEFAULT_POLICY", default_value = "fcfs")]
    default_policy: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let default_policy: PolicyKind = args
        .default_policy
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid DEFAULT_POLICY: {e}"))?;

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&args.store_url)
        .await?;
    let store = Arc::new(PgJobStore::new(pg_pool));
    store.migrate().await?;

    let redis_cfg = deadpool_redis::Config::from_url(&args.transport_url);
    let redis_pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let transport = Arc::new(RedisTransport::new(redis_pool, "carousel"));

    let recovered = carousel_core::JobStore::recover(store.as_ref()).await?;
    tracing::info!(recovered, "startup crash recovery complete");

    // Seed the transport's policy key so a fresh deployment's first tick
    // sees the configured default instead of the transport's own
    // absent-key fallback and immediately switches away from it.
    carousel_core::Transport::set_active_policy(transport.as_ref(), default_policy).await?;

    let config = EngineConfig {
        tick_interval: Duration::from_millis(args.engine_tick_ms),
        claim_batch: args.engine_claim_batch,
        dispatch_quota: None,
        default_policy,
    };

    let engine = Engine::new(store, transport, config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await;
    Ok(())
}
