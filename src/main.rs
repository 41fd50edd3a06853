use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pmarket_engine::api;
use pmarket_engine::config::Config;
use pmarket_engine::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    config.log();

    let engine = Arc::new(Engine::new(config.market.clone()));

    // Hourly reminder scan; the presentation layer is expected to pick
    // the fired market ids up and notify the owners.
    let scheduler = JobScheduler::new().await?;
    let job_engine = engine.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_id, _sched| {
            let engine = job_engine.clone();
            Box::pin(async move {
                for market_id in engine.due_reminders(Utc::now()) {
                    info!(market_id, "reminder fired");
                }
            })
        })?)
        .await?;
    scheduler.start().await?;

    let app = api::router(engine);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3001);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "market engine listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
