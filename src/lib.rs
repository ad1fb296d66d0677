//! RSS pipeline coordinator backend
//!
//! A stateful broker for distributed RSS ingestion: it discovers work,
//! leases it to stateless workers over three job surfaces (feed sync,
//! article crawl, vectorization), records outcomes and health, and serves
//! the combined relational + vector read side plus streaming transformers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod vector_store;

pub use config::{AppConfig, ConfigError, Environment, SchedulerConfig, VectorConfig};
pub use database::{create_pool, health_check as db_health_check, run_migrations};
pub use error::{AppError, ErrorResponse, Result};
pub use llm::LlmProviderFactory;
pub use middleware::{app_key_middleware, RateLimiter};
pub use services::{
    ArticleQueryService, AssistantService, CrawlService, DailyDigestService, FeedSyncService,
    HotTopicService, SummaryService, VectorizationService,
};
pub use vector_store::{MemoryVectorStore, VectorStore};

use store::{
    ArticleStore, ContentStore, CrawlStore, DigestStore, FeedStore, HotTopicStore,
    LlmProviderStore, ScriptStore, SyncLogStore, VectorTaskStore,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub feeds: FeedStore,
    pub scripts: ScriptStore,
    pub sync_logs: SyncLogStore,
    pub feed_sync: Arc<FeedSyncService>,
    pub crawl: Arc<CrawlService>,
    pub vectorization: Arc<VectorizationService>,
    pub summaries: Arc<SummaryService>,
    pub digests: Arc<DailyDigestService>,
    pub hot_topics: Arc<HotTopicService>,
    pub queries: Arc<ArticleQueryService>,
    pub assistant: AssistantService,
    pub worker_auth: Arc<config::WorkerAuthConfig>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire every store and service from a pool and configuration. The
    /// vector store defaults to the in-process implementation; callers can
    /// inject another engine behind the same trait.
    pub fn build(db_pool: PgPool, config: &AppConfig) -> Self {
        Self::build_with_vector_store(db_pool, config, Arc::new(MemoryVectorStore::new()))
    }

    pub fn build_with_vector_store(
        db_pool: PgPool,
        config: &AppConfig,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        let feeds = FeedStore::new(db_pool.clone());
        let articles = ArticleStore::new(db_pool.clone());
        let contents = ContentStore::new(db_pool.clone());
        let crawl_store = CrawlStore::new(db_pool.clone());
        let scripts = ScriptStore::new(db_pool.clone());
        let sync_logs = SyncLogStore::new(db_pool.clone());
        let vector_tasks = VectorTaskStore::new(db_pool.clone());
        let digest_store = DigestStore::new(db_pool.clone());
        let hot_topic_store = HotTopicStore::new(db_pool.clone());
        let provider_store = LlmProviderStore::new(db_pool.clone());

        let providers = LlmProviderFactory::new(
            provider_store,
            config.llm.default_chat_provider.clone(),
            config.llm.default_embedding_provider.clone(),
        );

        let summaries = Arc::new(SummaryService::new(
            articles.clone(),
            contents.clone(),
            providers.clone(),
        ));

        let feed_sync = Arc::new(FeedSyncService::new(
            feeds.clone(),
            articles.clone(),
            sync_logs.clone(),
            config.scheduler.clone(),
        ));

        let crawl = Arc::new(CrawlService::new(
            articles.clone(),
            contents.clone(),
            crawl_store,
            scripts.clone(),
            summaries.clone(),
        ));

        let vectorization = Arc::new(VectorizationService::new(
            articles.clone(),
            vector_tasks,
            vectors.clone(),
            providers.clone(),
            config.vector.clone(),
        ));

        let digests = Arc::new(DailyDigestService::new(
            digest_store,
            articles.clone(),
            feeds.clone(),
            providers.clone(),
        ));

        let hot_topics = Arc::new(HotTopicService::new(hot_topic_store, providers.clone()));

        let queries = Arc::new(ArticleQueryService::new(
            articles.clone(),
            contents.clone(),
            vectors,
            providers.clone(),
            config.vector.clone(),
        ));

        let assistant = AssistantService::new(articles, contents, providers);

        let rate_limiter = Arc::new(RateLimiter::new(
            config.worker_auth.rate_limit_per_window,
            config.worker_auth.rate_limit_window,
            config.worker_auth.rate_limit_block,
        ));

        Self {
            db_pool,
            feeds,
            scripts,
            sync_logs,
            feed_sync,
            crawl,
            vectorization,
            summaries,
            digests,
            hot_topics,
            queries,
            assistant,
            worker_auth: Arc::new(config.worker_auth.clone()),
            rate_limiter,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if database::health_check(&state.db_pool).await {
        "up"
    } else {
        "down"
    };
    let status = if database == "up" { "healthy" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        database: database.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let worker_guard = axum::middleware::from_fn_with_state(
        (state.worker_auth.clone(), state.rate_limiter.clone()),
        app_key_middleware,
    );

    let feed_sync_routes = Router::new()
        .route("/pending_feeds", get(handlers::feed_sync::pending_feeds))
        .route("/claim_feed", post(handlers::feed_sync::claim_feed))
        .route(
            "/submit_feed_result",
            post(handlers::feed_sync::submit_feed_result),
        )
        .route("/feed_sync_stats", get(handlers::feed_sync::feed_sync_stats))
        .route(
            "/reset_feed_failures",
            post(handlers::feed_sync::reset_feed_failures),
        );

    let crawler_routes = Router::new()
        .route("/pending_articles", get(handlers::crawler::pending_articles))
        .route("/claim_article", post(handlers::crawler::claim_article))
        .route("/submit_result", post(handlers::crawler::submit_result))
        .route("/logs", get(handlers::crawler::crawl_logs))
        .route("/stats", get(handlers::crawler::crawl_stats))
        .route("/reset_batch", post(handlers::crawler::reset_batch))
        .route("/reset_article", post(handlers::crawler::reset_article));

    let vectorization_routes = Router::new()
        .route(
            "/pending_vectorization",
            post(handlers::vectorization::pending_vectorization),
        )
        .route(
            "/claim_vectorization_task",
            post(handlers::vectorization::claim_vectorization_task),
        )
        .route(
            "/process_article_vectorization",
            post(handlers::vectorization::process_article_vectorization),
        )
        .route(
            "/update_article_step",
            post(handlers::vectorization::update_article_step),
        )
        .route("/stats", get(handlers::vectorization::vectorization_stats));

    let daily_summary_routes = Router::new()
        .route(
            "/get_feeds_needing_summary",
            get(handlers::daily_summary::get_feeds_needing_summary),
        )
        .route(
            "/process_feed_summary",
            get(handlers::daily_summary::process_feed_summary),
        );

    let jobs_routes = Router::new()
        .nest("/feed-sync", feed_sync_routes)
        .nest("/crawler", crawler_routes)
        .nest("/vectorization", vectorization_routes)
        .nest("/daily-summary", daily_summary_routes)
        .layer(worker_guard);

    let consumer_routes = Router::new()
        .route("/feeds", get(handlers::feeds::list_feeds).post(handlers::feeds::create_feed))
        .route("/feeds/:feed_id", get(handlers::feeds::get_feed))
        .route("/feeds/:feed_id/status", put(handlers::feeds::set_feed_status))
        .route("/feeds/:feed_id/sync_logs", get(handlers::feeds::feed_sync_logs))
        .route(
            "/feeds/:feed_id/scripts",
            get(handlers::feeds::list_scripts).post(handlers::feeds::create_script),
        )
        .route(
            "/feeds/:feed_id/scripts/published",
            get(handlers::feeds::published_script),
        )
        .route(
            "/scripts/:script_id/publish",
            post(handlers::feeds::publish_script),
        )
        .route("/articles", get(handlers::articles::list_articles))
        .route("/articles/stats", get(handlers::articles::article_stats))
        .route("/articles/search", post(handlers::articles::search_articles))
        .route("/articles/:article_id", get(handlers::articles::article_detail))
        .route(
            "/daily-summaries",
            get(handlers::daily_summary::list_daily_summaries),
        )
        .route(
            "/hot-topics/aggregate",
            post(handlers::hot_topics::trigger_aggregation),
        )
        .route("/hot-topics/unified", get(handlers::hot_topics::unified_topics))
        .route(
            "/assistant/articles/:article_id/summarize",
            post(handlers::assistant::summarize_article),
        )
        .route(
            "/assistant/articles/:article_id/translate",
            post(handlers::assistant::translate_article),
        );

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/jobs", jobs_routes)
        .nest("/api/v1", consumer_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router; worker auth needs the peer address for rate limiting.
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Coordinator listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
