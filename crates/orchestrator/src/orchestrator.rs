// crates/orchestrator/src/orchestrator.rs
//! Orchestrator - per-target probe sequencing and hashing

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

use tlsmark_common::{
    FingerprintOptions, FingerprintResult, FuzzyHasher, ProbeBuilder, ProbeCatalog,
    ProbeDescriptor, ProbeOutcome, ProbeStatus, ResponseParser, Target, TlsmarkError,
    TlsmarkResult,
};
use tlsmark_connector::{Connector, Dialer, ProbeStream};

use crate::sink::ResultSink;

/// Drives the collaborators for one target at a time.
///
/// Cloning is cheap: collaborators sit behind `Arc` and are only read.
pub struct Orchestrator<P: ProbeDescriptor> {
    catalog: Arc<dyn ProbeCatalog<P>>,
    builder: Arc<dyn ProbeBuilder<P>>,
    parser: Arc<dyn ResponseParser<P>>,
    hasher: Arc<dyn FuzzyHasher>,
    connector: Connector,
    options: FingerprintOptions,
}

impl<P: ProbeDescriptor> Clone for Orchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            builder: self.builder.clone(),
            parser: self.parser.clone(),
            hasher: self.hasher.clone(),
            connector: self.connector.clone(),
            options: self.options.clone(),
        }
    }
}

impl<P: ProbeDescriptor> Orchestrator<P> {
    /// Create an orchestrator dialing through the proxy environment with default options.
    pub fn new(
        catalog: Arc<dyn ProbeCatalog<P>>,
        builder: Arc<dyn ProbeBuilder<P>>,
        parser: Arc<dyn ResponseParser<P>>,
        hasher: Arc<dyn FuzzyHasher>,
    ) -> Self {
        let options = FingerprintOptions::default();
        let connector = Connector::from_env()
            .with_connect_timeout(options.connect_timeout)
            .with_default_backoff(options.default_backoff.clone());
        Self {
            catalog,
            builder,
            parser,
            hasher,
            connector,
            options,
        }
    }

    /// Replace the dial primitive (keeps the current connect timeout and default backoff).
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.connector = Connector::new(dialer)
            .with_connect_timeout(self.options.connect_timeout)
            .with_default_backoff(self.options.default_backoff.clone());
        self
    }

    pub fn with_options(mut self, options: FingerprintOptions) -> Self {
        self.connector = self
            .connector
            .with_connect_timeout(options.connect_timeout)
            .with_default_backoff(options.default_backoff.clone());
        self.options = options;
        self
    }

    pub fn options(&self) -> &FingerprintOptions {
        &self.options
    }

    /// Fingerprint one target.
    ///
    /// Fails only when a probe cannot get a connection; every other probe
    /// failure becomes an empty placeholder in the hashed string.
    #[instrument(skip(self, target), fields(addr = %target))]
    pub async fn fingerprint(&self, target: Target) -> TlsmarkResult<FingerprintResult> {
        let start = Instant::now();
        let probes = self.catalog.probes(&target.host, target.port);
        debug!(probes = probes.len(), "starting probe sequence");

        let mut parts: Vec<String> = Vec::with_capacity(probes.len());
        let mut outcomes = Vec::with_capacity(probes.len());

        for (index, probe) in probes.iter().enumerate() {
            let stream = match self.connector.connect_target(&target).await {
                Ok(s) => s,
                Err(e) => {
                    debug!(index, error = %e, "aborting target");
                    return Err(e);
                }
            };

            let (part, outcome) = self.run_probe(index, probe, stream).await;
            parts.push(part);
            outcomes.push(outcome);
        }

        let hash = self.hasher.hash(&parts.join(&self.options.delimiter));
        let result = FingerprintResult::completed(target, hash, outcomes, start.elapsed());
        info!(
            hash = %result.hash,
            degraded = result.is_degraded(),
            elapsed = ?result.elapsed,
            "fingerprint complete"
        );
        Ok(result)
    }

    /// [`fingerprint`](Self::fingerprint) with a failure folded into
    /// [`FingerprintResult::failed`] for the same target.
    pub async fn fingerprint_result(&self, target: Target) -> FingerprintResult {
        let start = Instant::now();
        match self.fingerprint(target.clone()).await {
            Ok(r) => r,
            Err(e) => FingerprintResult::failed(target, &e, start.elapsed()),
        }
    }

    /// Run [`fingerprint_result`](Self::fingerprint_result) and send exactly
    /// one result to `sink`. Returns whether the sink accepted it.
    pub async fn fingerprint_into<S>(&self, target: Target, sink: &S) -> bool
    where
        S: ResultSink + ?Sized,
    {
        let result = self.fingerprint_result(target).await;

        let addr = result.target.to_string();
        let delivered = sink.deliver(result).await;
        if !delivered {
            warn!(addr = %addr, "result sink closed, dropping result");
        }
        delivered
    }

    /// Fingerprint `target` on its own task, delivering the result to `sink`.
    pub fn spawn<S>(&self, target: Target, sink: S) -> JoinHandle<()>
    where
        S: ResultSink + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            this.fingerprint_into(target, &sink).await;
        })
    }

    /// [`fingerprint`](Self::fingerprint) bounded by an overall deadline.
    ///
    /// On expiry the in-flight unit is dropped, closing any open connection.
    pub async fn fingerprint_with_deadline(
        &self,
        target: Target,
        deadline: Duration,
    ) -> TlsmarkResult<FingerprintResult> {
        match timeout(deadline, self.fingerprint(target)).await {
            Ok(res) => res,
            Err(_) => Err(TlsmarkError::DeadlineExceeded(deadline)),
        }
    }

    /// Write, read, close, parse. Never fails: problems become placeholders.
    async fn run_probe(
        &self,
        index: usize,
        probe: &P,
        mut stream: ProbeStream,
    ) -> (String, ProbeOutcome) {
        let payload = self.builder.build(probe);

        let write = write_probe(&mut stream, &payload);
        let written = match timeout(self.options.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TlsmarkError::ProbeIo(e.to_string())),
            Err(_) => Err(TlsmarkError::ProbeIo("write timed out".to_string())),
        };
        if let Err(e) = written {
            debug!(index, error = %e, "probe write failed");
            drop(stream);
            return (String::new(), outcome(index, ProbeStatus::WriteFailed, 0, false));
        }

        let mut buf = vec![0u8; self.options.read_buffer_size];
        let (n, read_error) = match timeout(self.options.read_timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) => (n, false),
            Ok(Err(e)) => {
                debug!(index, error = %e, "probe read failed");
                (0, true)
            }
            Err(_) => {
                debug!(index, "probe read timed out");
                (0, true)
            }
        };
        drop(stream);

        match self.parser.parse(&buf, probe) {
            Ok(canonical) => (canonical, outcome(index, ProbeStatus::Parsed, n, read_error)),
            Err(e) => {
                let e = TlsmarkError::Parse(e.to_string());
                debug!(index, bytes = n, error = %e, "probe response rejected");
                (String::new(), outcome(index, ProbeStatus::ParseFailed, n, read_error))
            }
        }
    }
}

async fn write_probe(stream: &mut ProbeStream, payload: &[u8]) -> io::Result<()> {
    stream.write_all(payload).await?;
    stream.flush().await
}

fn outcome(index: usize, status: ProbeStatus, bytes_read: usize, read_error: bool) -> ProbeOutcome {
    ProbeOutcome {
        index,
        status,
        bytes_read,
        read_error,
    }
}
