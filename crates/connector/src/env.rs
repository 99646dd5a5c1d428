//! Dialer configured from the standard proxy environment
//!
//! `ALL_PROXY` (or `all_proxy`) names a `socks5://` or `socks5h://` proxy;
//! `NO_PROXY` (or `no_proxy`) lists hosts that bypass it. Anything else
//! dials directly.

use async_trait::async_trait;
use ipnet::IpNet;
use percent_encoding::percent_decode_str;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::dialer::{Dialer, DirectDialer, ProbeStream};
use crate::socks::{Credentials, Socks5Dialer};

pub const ALL_PROXY_VARS: [&str; 2] = ["ALL_PROXY", "all_proxy"];
pub const NO_PROXY_VARS: [&str; 2] = ["NO_PROXY", "no_proxy"];

const DEFAULT_SOCKS_PORT: u16 = 1080;

/// Hosts that must not go through the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoProxy {
    all: bool,
    nets: Vec<IpNet>,
    ips: Vec<IpAddr>,
    /// Stored with a leading dot.
    zones: Vec<String>,
    hosts: Vec<String>,
}

impl NoProxy {
    /// Parses a comma separated `NO_PROXY` value.
    pub fn parse(value: &str) -> Self {
        let mut np = NoProxy::default();
        for entry in value.split(',') {
            let entry = entry.trim().to_ascii_lowercase();
            if entry.is_empty() {
                continue;
            }
            if entry == "*" {
                np.all = true;
            } else if entry.contains('/') {
                match entry.parse::<IpNet>() {
                    Ok(net) => np.nets.push(net),
                    Err(_) => warn!(entry, "ignoring unparsable NO_PROXY network"),
                }
            } else if let Ok(ip) = entry.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
                np.ips.push(ip);
            } else if let Some(zone) = entry.strip_prefix("*.") {
                np.zones.push(format!(".{zone}"));
            } else if entry.starts_with('.') {
                np.zones.push(entry);
            } else {
                np.hosts.push(entry);
            }
        }
        np
    }

    #[must_use]
    pub fn bypasses(&self, host: &str) -> bool {
        if self.all {
            return true;
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.ips.contains(&ip) || self.nets.iter().any(|n| n.contains(&ip));
        }
        if self.hosts.iter().any(|h| *h == host) {
            return true;
        }
        self.zones
            .iter()
            .any(|z| host.ends_with(z.as_str()) || host == z[1..])
    }
}

/// Proxy-aware dialer built from environment variables.
#[derive(Debug, Clone)]
pub struct EnvDialer {
    proxy: Option<Socks5Dialer>,
    no_proxy: NoProxy,
}

impl EnvDialer {
    /// Reads `ALL_PROXY` / `NO_PROXY` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|&k| lookup(k))
                .find(|v| !v.trim().is_empty())
        };

        let proxy = first(&ALL_PROXY_VARS).and_then(|raw| parse_proxy_url(raw.trim()));
        let no_proxy = first(&NO_PROXY_VARS)
            .map(|v| NoProxy::parse(&v))
            .unwrap_or_default();

        match &proxy {
            Some(p) => debug!(proxy = p.proxy_addr(), "using SOCKS5 proxy from environment"),
            None => debug!("no proxy configured, dialing directly"),
        }

        Self { proxy, no_proxy }
    }

    /// A dialer that never uses a proxy.
    pub fn direct() -> Self {
        Self {
            proxy: None,
            no_proxy: NoProxy::default(),
        }
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&Socks5Dialer> {
        self.proxy.as_ref()
    }

    /// Proxy that applies to `host`, if any.
    #[must_use]
    pub fn route(&self, host: &str) -> Option<&Socks5Dialer> {
        self.proxy.as_ref().filter(|_| !self.no_proxy.bypasses(host))
    }
}

impl Default for EnvDialer {
    fn default() -> Self {
        Self::from_env()
    }
}

#[async_trait]
impl Dialer for EnvDialer {
    async fn dial(&self, host: &str, port: u16, connect_timeout: Duration) -> io::Result<ProbeStream> {
        match self.route(host) {
            Some(proxy) => proxy.dial(host, port, connect_timeout).await,
            None => DirectDialer.dial(host, port, connect_timeout).await,
        }
    }
}

fn parse_proxy_url(raw: &str) -> Option<Socks5Dialer> {
    let url = match Url::parse(raw) {
        Ok(u) => u,
        Err(e) => {
            warn!(proxy = raw, error = %e, "ignoring unparsable ALL_PROXY, dialing directly");
            return None;
        }
    };

    if !matches!(url.scheme(), "socks5" | "socks5h") {
        warn!(scheme = url.scheme(), "unsupported ALL_PROXY scheme, dialing directly");
        return None;
    }

    let Some(host) = url.host_str() else {
        warn!(proxy = raw, "ALL_PROXY has no host, dialing directly");
        return None;
    };
    let port = url.port().unwrap_or(DEFAULT_SOCKS_PORT);
    let addr = tlsmark_common::join_host_port(host.trim_start_matches('[').trim_end_matches(']'), port);

    let mut dialer = Socks5Dialer::new(addr);
    if !url.username().is_empty() {
        let username = decode_userinfo(url.username())?;
        let password = decode_userinfo(url.password().unwrap_or_default())?;
        dialer = dialer.with_credentials(Credentials { username, password });
    }
    Some(dialer)
}

/// Userinfo comes back percent-encoded from `Url`.
fn decode_userinfo(raw: &str) -> Option<String> {
    match percent_decode_str(raw).decode_utf8() {
        Ok(s) => Some(s.into_owned()),
        Err(e) => {
            warn!(error = %e, "ALL_PROXY credentials are not valid UTF-8, dialing directly");
            None
        }
    }
}
