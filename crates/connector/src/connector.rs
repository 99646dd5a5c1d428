//! Dial-with-retry
//!
//! One `connect` call yields at most `retries + 1` dial attempts, separated
//! by the backoff delay. Individual dial errors are logged and dropped; the
//! caller only sees whether a connection came out.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, trace};

use tlsmark_common::options::DEFAULT_CONNECT_TIMEOUT;
use tlsmark_common::{join_host_port, Backoff, Target, TlsmarkError, TlsmarkResult};

use crate::dialer::{Dialer, ProbeStream};
use crate::env::EnvDialer;

#[derive(Clone)]
pub struct Connector {
    dialer: Arc<dyn Dialer>,
    connect_timeout: Duration,
    default_backoff: Backoff,
}

impl Connector {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            default_backoff: Backoff::default(),
        }
    }

    /// Connector over the proxy configuration found in the environment.
    pub fn from_env() -> Self {
        Self::new(Arc::new(EnvDialer::from_env()))
    }

    /// Set the per-attempt connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Backoff used when a call supplies none.
    pub fn with_default_backoff(mut self, backoff: Backoff) -> Self {
        self.default_backoff = backoff;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect using the target's own retry policy.
    pub async fn connect_target(&self, target: &Target) -> TlsmarkResult<ProbeStream> {
        self.connect(&target.host, target.port, target.retries, target.backoff.as_ref())
            .await
    }

    /// Dial `host:port`, retrying up to `retries` more times after the first failure.
    #[instrument(skip(self, backoff))]
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        retries: u32,
        backoff: Option<&Backoff>,
    ) -> TlsmarkResult<ProbeStream> {
        let backoff = backoff.unwrap_or(&self.default_backoff);
        let mut attempt: u32 = 0;

        loop {
            match timeout(self.connect_timeout, self.dialer.dial(host, port, self.connect_timeout)).await {
                Ok(Ok(stream)) => {
                    trace!(attempt, "connected");
                    return Ok(stream);
                }
                Ok(Err(e)) => debug!(attempt, error = %e, "dial failed"),
                Err(_) => debug!(attempt, "dial timed out"),
            }

            // Zero retries: the first attempt is the only one, whatever its outcome.
            if attempt >= retries {
                break;
            }

            let wait = backoff.delay(attempt, retries);
            trace!(attempt, ?wait, "backing off");
            sleep(wait).await;
            attempt += 1;
        }

        Err(TlsmarkError::ConnectionExhausted {
            addr: join_host_port(host, port),
            attempts: attempt + 1,
        })
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("connect_timeout", &self.connect_timeout)
            .field("default_backoff", &self.default_backoff)
            .finish_non_exhaustive()
    }
}
