//! Error types for tlsmark
//!
//! Only `ConnectionExhausted` (and the external `DeadlineExceeded`) ever
//! reaches a caller as a failed fingerprint. Probe I/O and parse failures are
//! absorbed into placeholders; their variants exist for logging and outcomes.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TlsmarkError {
    #[error("connection to {addr} exhausted after {attempts} attempt(s)")]
    ConnectionExhausted { addr: String, attempts: u32 },

    #[error("probe I/O error: {0}")]
    ProbeIo(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("fingerprint deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

/// Result type alias for tlsmark operations
pub type TlsmarkResult<T> = Result<T, TlsmarkError>;
