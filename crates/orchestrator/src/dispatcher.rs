// crates/orchestrator/src/dispatcher.rs
//! Dispatcher - batch fan-out over a fixed worker pool

use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, instrument};

use tlsmark_common::{FingerprintResult, ProbeDescriptor, Target};

use crate::orchestrator::Orchestrator;
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::rate_limiter::RateLimiter;
use crate::sink::ResultSink;

pub const DEFAULT_CONCURRENCY: usize = 16;

/// Runs many targets through one [`Orchestrator`] and reports each to a sink.
pub struct Dispatcher<P: ProbeDescriptor> {
    orchestrator: Orchestrator<P>,
    concurrency: usize,
    rate_limiter: Option<Arc<RateLimiter>>,
    progress: Arc<ProgressTracker>,
}

impl<P: ProbeDescriptor> Dispatcher<P> {
    pub fn new(orchestrator: Orchestrator<P>) -> Self {
        Self {
            orchestrator,
            concurrency: DEFAULT_CONCURRENCY,
            rate_limiter: None,
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    /// Number of workers. Zero is raised to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Limit how many targets are started per second.
    pub fn with_rate_limit(mut self, targets_per_second: u32) -> Self {
        self.rate_limiter = Some(Arc::new(RateLimiter::new(targets_per_second)));
        self
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.progress.snapshot().await
    }

    /// Fingerprint every target, delivering one result per target to `sink`.
    #[instrument(skip(self, targets, sink), fields(targets = targets.len()))]
    pub async fn run<S>(&self, targets: Vec<Target>, sink: S) -> Result<()>
    where
        S: ResultSink + 'static,
    {
        self.progress.set_total(targets.len()).await;
        info!(concurrency = self.concurrency, "dispatching targets");

        let queue = Arc::new(Mutex::new(VecDeque::from(targets)));
        let sink = Arc::new(sink);

        let mut workers = Vec::with_capacity(self.concurrency);
        for _ in 0..self.concurrency {
            let queue = queue.clone();
            let sink = sink.clone();
            let orchestrator = self.orchestrator.clone();
            let rate_limiter = self.rate_limiter.clone();
            let progress = self.progress.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(target) = next else {
                        break;
                    };

                    if let Some(limiter) = &rate_limiter {
                        limiter.acquire().await;
                    }

                    let result = orchestrator.fingerprint_result(target).await;
                    progress.record(&result).await;

                    if !sink.deliver(result).await {
                        tracing::warn!("result sink closed, stopping worker");
                        break;
                    }
                }
            }));
        }

        for w in workers {
            w.await?;
        }

        self.progress.log_summary().await;
        Ok(())
    }

    /// Run every target and gather the results in completion order.
    pub async fn collect(&self, targets: Vec<Target>) -> Result<Vec<FingerprintResult>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.run(targets, tx).await?;

        let mut results = Vec::new();
        while let Some(r) = rx.recv().await {
            results.push(r);
        }
        Ok(results)
    }
}
