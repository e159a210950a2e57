use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use routine_backend::api::router;
use routine_backend::config::AppConfig;
use routine_backend::db;
use routine_backend::external::HttpScheduleSource;
use routine_backend::services::{SyncScheduler, SyncService};
use routine_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "routine_backend=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;

    let source = Arc::new(HttpScheduleSource::new(config.external.clone())?);
    let sync = Arc::new(SyncService::new(
        pool.clone(),
        source,
        config.sync.excluded_weekday,
    ));

    if config.sync.scheduler_enabled {
        let scheduler = SyncScheduler::new(sync.clone(), config.sync.daily_at);
        tokio::spawn(scheduler.start());
    } else {
        info!("Daily sync scheduler disabled");
    }

    let state = AppState { db: pool.clone(), sync };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
