//! Wiring smoke test: every surface mounts onto the router without touching
//! the database (the pool is lazy and never connected).

use rss_pipeline_backend::{create_router, AppConfig, AppState};
use sqlx::postgres::PgPoolOptions;

#[tokio::test]
async fn router_builds_with_all_surfaces() {
    let config = AppConfig::from_env().expect("dev config");
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("lazy pool");

    let state = AppState::build(pool, &config);
    let _router = create_router(state);
}
