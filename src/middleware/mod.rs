pub mod app_key;

pub use app_key::{app_key_middleware, RateLimiter, WorkerIdentity};
