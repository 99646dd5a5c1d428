//! Token bucket limiting how fast targets are started.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    tokens: Mutex<f64>,
    capacity: f64,
    refill_rate: f64,
    last_refill: Mutex<Instant>,
}

impl RateLimiter {
    /// A zero rate is treated as one target per second.
    pub fn new(targets_per_second: u32) -> Self {
        let rate = f64::from(targets_per_second.max(1));
        Self {
            tokens: Mutex::new(rate),
            capacity: rate,
            refill_rate: rate,
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        loop {
            let mut tokens = self.tokens.lock().await;
            let mut last_refill = self.last_refill.lock().await;

            let now = Instant::now();
            let elapsed = now.duration_since(*last_refill).as_secs_f64();
            let available = (*tokens + elapsed * self.refill_rate).min(self.capacity);

            if available >= 1.0 {
                *tokens = available - 1.0;
                *last_refill = now;
                return;
            }

            let wait = Duration::from_secs_f64((1.0 - available) / self.refill_rate);
            drop(tokens);
            drop(last_refill);
            tokio::time::sleep(wait).await;
        }
    }
}
