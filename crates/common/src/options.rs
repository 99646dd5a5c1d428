//! Per-operation deadlines and buffer sizing for a fingerprint run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::error::{TlsmarkError, TlsmarkResult};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Large enough for a ServerHello plus the start of the certificate chain.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1484;
pub const DEFAULT_DELIMITER: &str = ",";

pub const ENV_CONNECT_TIMEOUT_MS: &str = "TLSMARK_CONNECT_TIMEOUT_MS";
pub const ENV_WRITE_TIMEOUT_MS: &str = "TLSMARK_WRITE_TIMEOUT_MS";
pub const ENV_READ_TIMEOUT_MS: &str = "TLSMARK_READ_TIMEOUT_MS";
pub const ENV_READ_BUFFER_SIZE: &str = "TLSMARK_READ_BUFFER_SIZE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintOptions {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub read_buffer_size: usize,
    /// Joins per-probe strings before hashing.
    pub delimiter: String,
    /// Used for targets that carry no backoff of their own.
    #[serde(skip)]
    pub default_backoff: Backoff,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            delimiter: DEFAULT_DELIMITER.to_string(),
            default_backoff: Backoff::default(),
        }
    }
}

impl FingerprintOptions {
    /// Defaults overridden by `TLSMARK_*` environment variables.
    pub fn from_env() -> TlsmarkResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> TlsmarkResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_CONNECT_TIMEOUT_MS)? {
            opts.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_WRITE_TIMEOUT_MS)? {
            opts.write_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_READ_TIMEOUT_MS)? {
            opts.read_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<usize, _>(&lookup, ENV_READ_BUFFER_SIZE)? {
            if size == 0 {
                return Err(TlsmarkError::Config(format!(
                    "{ENV_READ_BUFFER_SIZE} must be greater than zero"
                )));
            }
            opts.read_buffer_size = size;
        }

        Ok(opts)
    }

    #[inline]
    #[must_use]
    pub fn with_default_backoff(mut self, backoff: Backoff) -> Self {
        self.default_backoff = backoff;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_io_timeouts(mut self, write: Duration, read: Duration) -> Self {
        self.write_timeout = write;
        self.read_timeout = read;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> TlsmarkResult<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TlsmarkError::Config(format!("{key}={raw} is not a valid number"))),
    }
}
