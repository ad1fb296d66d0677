pub mod assistant;
pub mod crawl;
pub mod daily_digest;
pub mod feed_sync;
pub mod hot_topics;
pub mod retrieval;
pub mod summary;
pub mod vectorization;

pub use assistant::{AssistantEvent, AssistantService};
pub use crawl::CrawlService;
pub use daily_digest::DailyDigestService;
pub use feed_sync::FeedSyncService;
pub use hot_topics::HotTopicService;
pub use retrieval::ArticleQueryService;
pub use summary::SummaryService;
pub use vectorization::VectorizationService;
