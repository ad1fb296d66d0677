pub mod article;
pub mod crawl;
pub mod digest;
pub mod feed;
pub mod hot_topic;
pub mod pagination;
pub mod script;
pub mod vectorization;

pub use article::*;
pub use crawl::*;
pub use digest::*;
pub use feed::*;
pub use hot_topic::*;
pub use pagination::*;
pub use script::*;
pub use vectorization::*;
