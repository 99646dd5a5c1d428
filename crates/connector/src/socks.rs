//! SOCKS5 client (RFC 1928, with RFC 1929 username/password)
//!
//! Only the CONNECT command is implemented. Host names are sent unresolved
//! so the proxy resolves them.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use tlsmark_common::TlsmarkError;

use crate::dialer::{timed_out, Dialer, DirectDialer, ProbeStream};

const VERSION: u8 = 0x05;
const AUTH_VERSION: u8 = 0x01;
const METHOD_NONE: u8 = 0x00;
const METHOD_USER_PASS: u8 = 0x02;
const METHOD_UNACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const ATYP_V4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_V6: u8 = 0x04;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Tunnels every dial through one SOCKS5 proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Dialer {
    proxy_addr: String,
    credentials: Option<Credentials>,
}

impl Socks5Dialer {
    pub fn new<S: Into<String>>(proxy_addr: S) -> Self {
        Self {
            proxy_addr: proxy_addr.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn proxy_addr(&self) -> &str {
        &self.proxy_addr
    }
}

#[async_trait]
impl Dialer for Socks5Dialer {
    async fn dial(&self, host: &str, port: u16, connect_timeout: Duration) -> io::Result<ProbeStream> {
        // The deadline covers the proxy connect and the whole negotiation.
        let tunnel = async {
            let mut stream = DirectDialer::connect_tcp(&self.proxy_addr, connect_timeout).await?;
            handshake(&mut stream, host, port, self.credentials.as_ref()).await?;
            debug!(proxy = %self.proxy_addr, host, port, "socks5 tunnel established");
            Ok::<ProbeStream, io::Error>(Box::new(stream))
        };
        timeout(connect_timeout, tunnel).await.map_err(|_| timed_out())?
    }
}

/// Negotiates a CONNECT to `host:port` over an already-open proxy stream.
pub async fn handshake<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    credentials: Option<&Credentials>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting: &[u8] = match credentials {
        Some(_) => &[VERSION, 2, METHOD_NONE, METHOD_USER_PASS],
        None => &[VERSION, 1, METHOD_NONE],
    };
    stream.write_all(greeting).await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != VERSION {
        return Err(proxy_err(format!("unexpected SOCKS version {}", choice[0])));
    }
    match (choice[1], credentials) {
        (METHOD_NONE, _) => {}
        (METHOD_USER_PASS, Some(creds)) => authenticate(stream, creds).await?,
        (METHOD_UNACCEPTABLE, _) => {
            return Err(proxy_err("no acceptable authentication method".to_string()))
        }
        (method, _) => {
            return Err(proxy_err(format!("unsupported authentication method {method:#04x}")))
        }
    }

    let mut request = vec![VERSION, CMD_CONNECT, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            request.push(ATYP_V4);
            request.extend_from_slice(&v4.octets());
        }
        Ok(IpAddr::V6(v6)) => {
            request.push(ATYP_V6);
            request.extend_from_slice(&v6.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len())
                .map_err(|_| proxy_err(format!("host name too long: {host}")))?;
            request.push(ATYP_DOMAIN);
            request.push(len);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(proxy_err(format!("unexpected SOCKS version {}", head[0])));
    }
    if head[1] != 0x00 {
        return Err(proxy_err(format!("connect rejected: {}", reply_message(head[1]))));
    }

    // Discard the bound address; the tunnel is usable once it is consumed.
    let addr_len = match head[3] {
        ATYP_V4 => 4,
        ATYP_V6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0])
        }
        other => return Err(proxy_err(format!("unknown address type {other:#04x}"))),
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;

    Ok(())
}

async fn authenticate<S>(stream: &mut S, creds: &Credentials) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ulen = u8::try_from(creds.username.len())
        .map_err(|_| proxy_err("username too long".to_string()))?;
    let plen = u8::try_from(creds.password.len())
        .map_err(|_| proxy_err("password too long".to_string()))?;

    let mut msg = Vec::with_capacity(3 + creds.username.len() + creds.password.len());
    msg.push(AUTH_VERSION);
    msg.push(ulen);
    msg.extend_from_slice(creds.username.as_bytes());
    msg.push(plen);
    msg.extend_from_slice(creds.password.as_bytes());
    stream.write_all(&msg).await?;

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] != 0x00 {
        return Err(proxy_err("authentication rejected".to_string()));
    }
    Ok(())
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

fn proxy_err(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::Other, TlsmarkError::Proxy(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    /// Minimal SOCKS5 server: optional user/pass, replies with `rep`, then echoes.
    async fn fake_proxy(expect_auth: Option<(&'static str, &'static str)>, rep: u8) -> (u16, tokio::task::JoinHandle<(u8, Vec<u8>, u16)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            serve(&mut s, expect_auth, rep).await
        });
        (port, handle)
    }

    async fn serve(s: &mut TcpStream, expect_auth: Option<(&str, &str)>, rep: u8) -> (u8, Vec<u8>, u16) {
        let mut head = [0u8; 2];
        s.read_exact(&mut head).await.unwrap();
        let mut methods = vec![0u8; head[1] as usize];
        s.read_exact(&mut methods).await.unwrap();

        if let Some((user, pass)) = expect_auth {
            assert!(methods.contains(&METHOD_USER_PASS));
            s.write_all(&[VERSION, METHOD_USER_PASS]).await.unwrap();
            let mut v = [0u8; 2];
            s.read_exact(&mut v).await.unwrap();
            let mut u = vec![0u8; v[1] as usize];
            s.read_exact(&mut u).await.unwrap();
            let mut pl = [0u8; 1];
            s.read_exact(&mut pl).await.unwrap();
            let mut p = vec![0u8; pl[0] as usize];
            s.read_exact(&mut p).await.unwrap();
            let ok = u == user.as_bytes() && p == pass.as_bytes();
            s.write_all(&[AUTH_VERSION, if ok { 0 } else { 1 }]).await.unwrap();
        } else {
            s.write_all(&[VERSION, METHOD_NONE]).await.unwrap();
        }

        let mut req = [0u8; 4];
        s.read_exact(&mut req).await.unwrap();
        let atyp = req[3];
        let addr = match atyp {
            ATYP_V4 => {
                let mut a = vec![0u8; 4];
                s.read_exact(&mut a).await.unwrap();
                a
            }
            ATYP_V6 => {
                let mut a = vec![0u8; 16];
                s.read_exact(&mut a).await.unwrap();
                a
            }
            _ => {
                let mut l = [0u8; 1];
                s.read_exact(&mut l).await.unwrap();
                let mut a = vec![0u8; l[0] as usize];
                s.read_exact(&mut a).await.unwrap();
                a
            }
        };
        let mut port = [0u8; 2];
        s.read_exact(&mut port).await.unwrap();

        s.write_all(&[VERSION, rep, 0, ATYP_V4, 0, 0, 0, 0, 0, 0]).await.unwrap();
        if rep == 0 {
            let mut buf = [0u8; 5];
            if s.read_exact(&mut buf).await.is_ok() {
                s.write_all(&buf).await.unwrap();
            }
        }
        (atyp, addr, u16::from_be_bytes(port))
    }

    #[tokio::test]
    async fn connect_by_name_without_auth() {
        let (port, server) = fake_proxy(None, 0).await;
        let dialer = Socks5Dialer::new(format!("127.0.0.1:{port}"));
        let mut stream = dialer
            .dial("example.test", 443, Duration::from_secs(2))
            .await
            .unwrap();
        stream.write_all(b"hello").await.unwrap();
        let mut echo = [0u8; 5];
        stream.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"hello");

        let (atyp, addr, dport) = server.await.unwrap();
        assert_eq!(atyp, ATYP_DOMAIN);
        assert_eq!(addr, b"example.test");
        assert_eq!(dport, 443);
    }

    #[tokio::test]
    async fn connect_by_ip_with_credentials() {
        let (port, server) = fake_proxy(Some(("scan", "s3cret")), 0).await;
        let dialer = Socks5Dialer::new(format!("127.0.0.1:{port}")).with_credentials(Credentials {
            username: "scan".into(),
            password: "s3cret".into(),
        });
        let mut stream = dialer.dial("10.1.2.3", 8443, Duration::from_secs(2)).await.unwrap();
        stream.write_all(b"12345").await.unwrap();
        let mut echo = [0u8; 5];
        stream.read_exact(&mut echo).await.unwrap();

        let (atyp, addr, dport) = server.await.unwrap();
        assert_eq!(atyp, ATYP_V4);
        assert_eq!(addr, vec![10, 1, 2, 3]);
        assert_eq!(dport, 8443);
    }

    #[tokio::test]
    async fn rejected_connect_is_proxy_error() {
        let (port, server) = fake_proxy(None, 0x05).await;
        let dialer = Socks5Dialer::new(format!("127.0.0.1:{port}"));
        let err = match dialer.dial("example.test", 443, Duration::from_secs(2)).await {
            Ok(_) => panic!("connect should have been rejected"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("connection refused"));
        server.await.unwrap();
    }

    #[test]
    fn credentials_debug_hides_password() {
        let c = Credentials { username: "u".into(), password: "p4ss".into() };
        assert!(!format!("{c:?}").contains("p4ss"));
    }
}
