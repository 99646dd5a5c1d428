//! In-memory collaborators and a scripted dialer for orchestrator tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use tlsmark_common::{FuzzyHasher, ProbeBuilder, ProbeCatalog, ResponseParser};
use tlsmark_connector::{Dialer, ProbeStream};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, PartialEq)]
pub struct FakeProbe(pub usize);

pub struct FakeCatalog(pub usize);

impl ProbeCatalog<FakeProbe> for FakeCatalog {
    fn probes(&self, _host: &str, _port: u16) -> Vec<FakeProbe> {
        (0..self.0).map(FakeProbe).collect()
    }
}

pub struct FakeBuilder;

impl ProbeBuilder<FakeProbe> for FakeBuilder {
    fn build(&self, probe: &FakeProbe) -> Vec<u8> {
        format!("probe-{}", probe.0).into_bytes()
    }
}

/// Accepts any non-empty UTF-8 reply except the literal `garbage`.
/// Trailing zero fill from the read buffer is ignored.
pub struct FakeParser;

impl ResponseParser<FakeProbe> for FakeParser {
    fn parse(&self, response: &[u8], _probe: &FakeProbe) -> Result<String> {
        let text = std::str::from_utf8(response)?.trim_end_matches('\0');
        if text.is_empty() || text == "garbage" {
            bail!("unrecognized reply {text:?}");
        }
        Ok(text.to_string())
    }
}

/// Wraps the joined string so tests can assert on exactly what was hashed.
pub struct IdentityHasher;

impl FuzzyHasher for IdentityHasher {
    fn hash(&self, joined: &str) -> String {
        format!("h({joined})")
    }
}

/// What the fake server does with the n-th connection to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `"{host}|{request}"`
    Echo,
    Garbage,
    /// Closes without writing.
    Silent,
    /// Reads the request and never answers.
    Stall,
    /// Drops its end before the client writes.
    RefuseWrite,
}

/// Dialer handing out duplex streams served by scripted tasks.
#[derive(Default)]
pub struct ScriptedDialer {
    replies: HashMap<usize, Reply>,
    delays: HashMap<usize, Duration>,
    failing_hosts: HashSet<String>,
    failing_dials: HashSet<u32>,
    fail_first: u32,
    dials: AtomicU32,
    connections: AtomicUsize,
    ordinals: Mutex<HashMap<String, usize>>,
}

impl ScriptedDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, ordinal: usize, reply: Reply) -> Self {
        self.replies.insert(ordinal, reply);
        self
    }

    pub fn delay(mut self, ordinal: usize, delay: Duration) -> Self {
        self.delays.insert(ordinal, delay);
        self
    }

    pub fn fail_host(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    /// Fail only the dial with this overall index.
    pub fn fail_dial(mut self, index: u32) -> Self {
        self.failing_dials.insert(index);
        self
    }

    pub fn fail_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn dials(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Make the next connection to every host ordinal 0 again.
    pub fn reset_ordinals(&self) {
        self.ordinals.lock().unwrap().clear();
    }

    fn next_ordinal(&self, host: &str) -> usize {
        let mut ordinals = self.ordinals.lock().unwrap();
        let n = ordinals.entry(host.to_string()).or_insert(0);
        let ordinal = *n;
        *n += 1;
        ordinal
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self, host: &str, _port: u16, _connect_timeout: Duration) -> io::Result<ProbeStream> {
        let index = self.dials.fetch_add(1, Ordering::SeqCst);
        if index < self.fail_first || self.failing_dials.contains(&index) || self.failing_hosts.contains(host) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted refusal"));
        }

        let ordinal = self.next_ordinal(host);
        self.connections.fetch_add(1, Ordering::SeqCst);

        let reply = self.replies.get(&ordinal).copied().unwrap_or(Reply::Echo);
        let delay = self.delays.get(&ordinal).copied().unwrap_or_default();
        let (client, mut server) = tokio::io::duplex(4096);

        if reply == Reply::RefuseWrite {
            drop(server);
            return Ok(Box::new(client));
        }

        let host = host.to_string();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap_or(0);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let body = match reply {
                Reply::Echo => format!("{host}|{}", String::from_utf8_lossy(&buf[..n])),
                Reply::Garbage => "garbage".to_string(),
                Reply::Silent | Reply::RefuseWrite => return,
                Reply::Stall => std::future::pending::<String>().await,
            };
            let _ = server.write_all(body.as_bytes()).await;
        });

        Ok(Box::new(client))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tlsmark=debug")
        .with_test_writer()
        .try_init();
}

/// Orchestrator over the fakes with `probes` probes per target.
pub fn fake_orchestrator(probes: usize, dialer: Arc<dyn Dialer>) -> Orchestrator<FakeProbe> {
    init_tracing();
    Orchestrator::new(
        Arc::new(FakeCatalog(probes)),
        Arc::new(FakeBuilder),
        Arc::new(FakeParser),
        Arc::new(IdentityHasher),
    )
    .with_dialer(dialer)
}
