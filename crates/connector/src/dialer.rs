//! Dial primitives
//!
//! A `Dialer` opens one byte stream to `host:port` within a timeout. The
//! stream is boxed so direct TCP, SOCKS-tunnelled TCP and in-memory test
//! streams all look the same to the probe loop.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use tlsmark_common::join_host_port;

/// Anything the probe loop can write a probe to and read a reply from.
pub trait RawStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> RawStream for T {}

/// An open connection owned by exactly one probe.
pub type ProbeStream = Box<dyn RawStream>;

#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a connection to `host:port`, failing once `connect_timeout` elapses.
    async fn dial(&self, host: &str, port: u16, connect_timeout: Duration) -> io::Result<ProbeStream>;
}

/// Plain TCP with no proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

impl DirectDialer {
    /// Connect and hand back the concrete stream (used by the SOCKS dialer).
    pub(crate) async fn connect_tcp(
        addr: &str,
        connect_timeout: Duration,
    ) -> io::Result<TcpStream> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| timed_out())??;
        stream.set_nodelay(true)?;
        trace!(addr, "tcp connected");
        Ok(stream)
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, host: &str, port: u16, connect_timeout: Duration) -> io::Result<ProbeStream> {
        let addr = join_host_port(host, port);
        let stream = Self::connect_tcp(&addr, connect_timeout).await?;
        Ok(Box::new(stream))
    }
}

pub(crate) fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "connection timed out")
}
