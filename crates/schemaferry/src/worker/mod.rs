//! Concurrency primitives: rate limiters, the bounded worker pool, and the
//! checkpoint store

pub mod checkpoint;
pub mod pool;
pub mod ratelimit;

pub use checkpoint::CheckpointStore;
pub use pool::{Pool, ProgressFn};
pub use ratelimit::{RateLimiter, RateLimiters};
