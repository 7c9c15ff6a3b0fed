//! Concurrency primitives: worker pool, semaphore, rate limiter, barrier,
//! safe map, rw counter, and once pool.

mod barrier;
mod once_pool;
mod rate_limiter;
mod rw_counter;
mod safe_map;
mod semaphore;
mod worker_pool;

pub use barrier::Barrier;
pub use once_pool::OncePool;
pub use rate_limiter::RateLimiter;
pub use rw_counter::RwCounter;
pub use safe_map::SafeMap;
pub use semaphore::{Permit, Semaphore};
pub use worker_pool::{WorkerPool, WorkerPoolStats};
