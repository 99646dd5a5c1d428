//! tlsmark Common - Shared types and traits
//!
//! This crate provides the data model, collaborator traits, error taxonomy
//! and run options used across the tlsmark fingerprinting workspace.

pub mod backoff;
pub mod error;
pub mod options;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use backoff::{Backoff, DEFAULT_BACKOFF_DELAY};
pub use error::{TlsmarkError, TlsmarkResult};
pub use options::FingerprintOptions;
pub use traits::{FuzzyHasher, ProbeBuilder, ProbeCatalog, ProbeDescriptor, ResponseParser};
pub use types::{join_host_port, FingerprintResult, ProbeOutcome, ProbeStatus, Target};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
