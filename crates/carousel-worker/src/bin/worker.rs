//! The `carousel-worker` binary: connects to Postgres and Redis, registers
//! the example handlers, and runs the fixed executor pool until signaled
//! to stop.

use std::sync::Arc;
use std::time::Duration;

use carousel_worker::handlers::build_registry;
use carousel_worker::{WorkerConfig, WorkerPool};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "carousel-worker", about = "Carousel worker pool")]
struct Args {
    #[arg(long, env = "STORE_URL")]
    store_url: String,

    #[arg(long, env = "TRANSPORT_URL")]
    transport_url: String,

    #[arg(long, env = "WORKER_POOL_SIZE", default_value_t = 4)]
    worker_pool_size: usize,

    #[arg(long, env = "WORKER_POP_TIMEOUT_S", default_value_t = 5)]
    worker_pop_timeout_s: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(args.worker_pool_size as u32 + 2)
        .connect(&args.store_url)
        .await?;
    let store = Arc::new(carousel_store_postgres::PgJobStore::new(pg_pool));

    let redis_cfg = deadpool_redis::Config::from_url(&args.transport_url);
    let redis_pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let transport = Arc::new(carousel_transport_redis::RedisTransport::new(
        redis_pool, "carousel",
    ));

    let registry = build_registry();

    let config = WorkerConfig {
        pool_size: args.worker_pool_size,
        pop_timeout: Duration::from_secs(args.worker_pop_timeout_s),
    };

    let pool = WorkerPool::new(store, transport, registry, config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    pool.run(shutdown_rx).await;
    Ok(())
}
