//! Connector - proxy-aware TCP dialing with bounded retry
//!
//! This crate provides:
//! - the `Dialer` seam and a boxed stream type for probe connections
//! - a direct TCP dialer and a SOCKS5 dialer
//! - an environment-configured dialer (`ALL_PROXY` / `NO_PROXY`)
//! - `Connector`, which retries a dialer with a configurable backoff

mod connector;
pub mod dialer;
pub mod env;
pub mod socks;

pub use connector::Connector;
pub use dialer::{Dialer, DirectDialer, ProbeStream, RawStream};
pub use env::{EnvDialer, NoProxy};
pub use socks::{Credentials, Socks5Dialer};
