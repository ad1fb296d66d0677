//! Relational store adapters, one per entity.
//!
//! Each adapter owns the SQL for its entity and exposes typed CRUD plus
//! filtered, paginated listings. Claim operations are expressed as single
//! atomic `UPDATE ... WHERE` statements covering the expected pre-state, so
//! two racing workers can never both win a lease.

pub mod article_store;
pub mod content_store;
pub mod crawl_store;
pub mod digest_store;
pub mod feed_store;
pub mod hot_topic_store;
pub mod llm_store;
pub mod script_store;
pub mod sync_log_store;
pub mod vector_task_store;

pub use article_store::ArticleStore;
pub use content_store::ContentStore;
pub use crawl_store::CrawlStore;
pub use digest_store::DigestStore;
pub use feed_store::FeedStore;
pub use hot_topic_store::HotTopicStore;
pub use llm_store::LlmProviderStore;
pub use script_store::ScriptStore;
pub use sync_log_store::SyncLogStore;
pub use vector_task_store::VectorTaskStore;
