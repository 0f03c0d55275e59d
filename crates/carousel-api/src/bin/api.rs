//! The `carousel-api` binary: the submission/management HTTP surface,
//! backed by Postgres and Redis.

use std::sync::Arc;

use carousel_api::{build_router, AppState};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "carousel-api", about = "Carousel submission and management API")]
struct Args {
    #[arg(long, env = "STORE_URL")]
    store_url: String,

    #[arg(long, env = "TRANSPORT_URL")]
    transport_url: String,

    #[arg(long, env = "WORKER_POOL_SIZE", default_value_t = 4)]
    worker_pool_size: usize,

    #[arg(long, env = "DEFAULT_MAX_RETRIES", default_value_t = 3)]
    default_max_retries: u32,

    #[arg(long, env = "API_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&args.store_url)
        .await?;
    let store = Arc::new(carousel_store_postgres::PgJobStore::new(pg_pool));

    let redis_cfg = deadpool_redis::Config::from_url(&args.transport_url);
    let redis_pool = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let transport = Arc::new(carousel_transport_redis::RedisTransport::new(
        redis_pool, "carousel",
    ));

    let known_job_types = carousel_worker::handlers::build_registry()
        .known_job_types()
        .into_iter()
        .map(String::from)
        .collect();

    let state = AppState {
        store,
        transport,
        known_job_types,
        default_max_retries: args.default_max_retries,
        pool_size: args.worker_pool_size,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind_addr).await?;
    tracing::info!(addr = %args.bind_addr, "carousel-api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
