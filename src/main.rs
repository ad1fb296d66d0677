use std::net::SocketAddr;

use rss_pipeline_backend::{create_pool, create_router, run_migrations, AppConfig, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rss_pipeline_backend=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let state = AppState::build(pool, &config);
    let router = create_router(state);

    let addr: SocketAddr = config.server.bind_address().parse()?;
    rss_pipeline_backend::serve(router, addr).await
}
