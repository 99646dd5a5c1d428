//! Orchestrator - per-target fingerprinting and fan-out
//!
//! `Orchestrator` runs the ordered probe sequence for one target and hashes
//! the outcome. `spawn`/`fingerprint_into` deliver one result per target to a
//! caller-owned `ResultSink`; `Dispatcher` adds a bounded worker pool on top.

mod dispatcher;
mod orchestrator;
mod progress;
mod rate_limiter;
mod sink;

#[cfg(test)]
mod testing;

pub use dispatcher::{Dispatcher, DEFAULT_CONCURRENCY};
pub use orchestrator::Orchestrator;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use rate_limiter::RateLimiter;
pub use sink::ResultSink;
