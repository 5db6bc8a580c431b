//! HTTP CONNECT tunnelling for backends behind a proxy

use std::fmt;
use std::io;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Longest response header block accepted from the proxy
const MAX_RESPONSE_HEADER: usize = 8 * 1024;

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Open a TCP connection to the proxy and tunnel it to `host:port`
    pub async fn tunnel(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        debug!("Connecting to {}:{} via proxy {}:{}", host, port, self.host, self.port);
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        self.handshake(&mut stream, host, port).await?;
        Ok(stream)
    }

    async fn handshake<S>(&self, stream: &mut S, host: &str, port: u16) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream
            .write_all(self.connect_request(host, port).as_bytes())
            .await?;
        stream.flush().await?;

        let header = read_response_header(stream).await?;
        let status = parse_status(&header)?;
        if !(200..300).contains(&status) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("proxy {}:{} refused CONNECT with status {}", self.host, self.port, status),
            ));
        }
        Ok(())
    }

    fn connect_request(&self, host: &str, port: u16) -> String {
        let mut request = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n"
        );
        if let Some(username) = &self.username {
            let credentials = format!("{}:{}", username, self.password.as_deref().unwrap_or(""));
            request.push_str(&format!(
                "Proxy-Authorization: Basic {}\r\n",
                STANDARD.encode(credentials)
            ));
        }
        request.push_str("\r\n");
        request
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Read byte by byte up to the blank line so nothing past the header is consumed
async fn read_response_header<S>(stream: &mut S) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut header = Vec::with_capacity(128);
    let mut byte = [0u8; 1];

    while !header.ends_with(b"\r\n\r\n") {
        if header.len() >= MAX_RESPONSE_HEADER {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "proxy response header too long",
            ));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection during CONNECT",
            ));
        }
        header.push(byte[0]);
    }

    String::from_utf8(header)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "proxy response is not UTF-8"))
}

fn parse_status(header: &str) -> io::Result<u16> {
    let line = header.lines().next().unwrap_or_default();
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next().map(str::parse::<u16>)) {
        (Some(version), Some(Ok(status))) if version.starts_with("HTTP/") => Ok(status),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed proxy status line: {:?}", line),
        )),
    }
}
