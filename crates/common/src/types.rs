//! Core data types for tlsmark
//!
//! `Target` is what a caller hands in, `FingerprintResult` is what comes back.
//! Both are plain values: cloned into tasks, never shared mutably.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use crate::backoff::Backoff;
use crate::error::TlsmarkError;

/// One fingerprinting request: host, port and the connect retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
    /// Additional connect attempts per probe. 0 means a single attempt.
    #[serde(default)]
    pub retries: u32,
    /// `None` falls back to the orchestrator's default backoff.
    #[serde(skip)]
    pub backoff: Option<Backoff>,
}

impl Target {
    #[inline]
    #[must_use]
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            retries: 0,
            backoff: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// `host:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr())
    }
}

impl FromStr for Target {
    type Err = TlsmarkError;

    /// Parses `host:port` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| TlsmarkError::InvalidTarget(format!("unclosed bracket in {s}")))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| TlsmarkError::InvalidTarget(format!("missing port in {s}")))?;
            (host, port)
        } else {
            let (host, port) = s
                .rsplit_once(':')
                .ok_or_else(|| TlsmarkError::InvalidTarget(format!("missing port in {s}")))?;
            if host.contains(':') {
                return Err(TlsmarkError::InvalidTarget(format!(
                    "IPv6 host must be bracketed: {s}"
                )));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(TlsmarkError::InvalidTarget(format!("empty host in {s}")));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| TlsmarkError::InvalidTarget(format!("invalid port in {s}")))?;

        Ok(Target::new(host, port))
    }
}

/// Joins a host and port the way a dialer expects them.
#[must_use]
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// How a single probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The response parsed into a canonical string.
    Parsed,
    /// Writing the probe failed or timed out; placeholder recorded.
    WriteFailed,
    /// The response did not parse; placeholder recorded.
    ParseFailed,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeStatus::Parsed => "parsed",
            ProbeStatus::WriteFailed => "write_failed",
            ProbeStatus::ParseFailed => "parse_failed",
        };
        f.write_str(s)
    }
}

/// Per-probe status entry, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub index: usize,
    pub status: ProbeStatus,
    pub bytes_read: usize,
    /// The read hit an error or its deadline; the parser then saw a zero-filled buffer.
    pub read_error: bool,
}

impl ProbeOutcome {
    #[inline]
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        !matches!(self.status, ProbeStatus::Parsed)
    }
}

/// Outcome of fingerprinting one target.
///
/// `error.is_some()` implies `hash.is_empty()`. On success `hash` is always
/// set, even when every probe degraded to a placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintResult {
    pub target: Target,
    pub hash: String,
    pub error: Option<String>,
    pub outcomes: Vec<ProbeOutcome>,
    pub timestamp: SystemTime,
    pub elapsed: Duration,
}

impl FingerprintResult {
    #[must_use]
    pub fn completed(
        target: Target,
        hash: String,
        outcomes: Vec<ProbeOutcome>,
        elapsed: Duration,
    ) -> Self {
        Self {
            target,
            hash,
            error: None,
            outcomes,
            timestamp: SystemTime::now(),
            elapsed,
        }
    }

    /// Failure result for `target`: empty hash, rendered error.
    #[must_use]
    pub fn failed(target: Target, error: &TlsmarkError, elapsed: Duration) -> Self {
        Self {
            target,
            hash: String::new(),
            error: Some(error.to_string()),
            outcomes: Vec::new(),
            timestamp: SystemTime::now(),
            elapsed,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// True when at least one probe contributed a placeholder.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.outcomes.iter().any(ProbeOutcome::is_placeholder)
    }
}
