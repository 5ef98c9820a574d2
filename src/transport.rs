use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::error::{Result, SprintError};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SOCKS_VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const RESERVED: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// SOCKS5 proxy address, parsed once at startup and threaded explicitly
/// through the dialer and the HTTP client builder.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    host: String,
    port: u16,
}

impl ProxyConfig {
    pub fn parse(value: &str) -> Result<Self> {
        let (host, port) = split_host_port(value).ok_or_else(|| SprintError::Proxy {
            endpoint: value.to_string(),
            reason: "address must be host:port".to_string(),
        })?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn socks_url(&self) -> String {
        format!("socks5://{}:{}", self.host, self.port)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opens byte-stream connections to measurement servers. Swapping the
/// implementation is how every connection gets routed through a proxy.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, endpoint: &str) -> Result<TcpStream>;
}

/// Plain TCP with a fixed connect timeout.
pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, endpoint: &str) -> Result<TcpStream> {
        connect(endpoint).await
    }
}

/// Tunnels every connection through a SOCKS5 proxy (CONNECT, no auth,
/// domain-name addressing).
pub struct Socks5Dialer {
    proxy: ProxyConfig,
}

impl Socks5Dialer {
    pub fn new(proxy: ProxyConfig) -> Self {
        Self { proxy }
    }

    async fn handshake(&self, stream: &mut TcpStream, endpoint: &str) -> Result<()> {
        let (host, port) = split_host_port(endpoint).ok_or_else(|| SprintError::Proxy {
            endpoint: endpoint.to_string(),
            reason: "target must be host:port".to_string(),
        })?;
        if host.len() > u8::MAX as usize {
            return Err(SprintError::Proxy {
                endpoint: endpoint.to_string(),
                reason: "hostname too long for SOCKS5".to_string(),
            });
        }

        stream
            .write_all(&[SOCKS_VERSION, 1, NO_AUTH])
            .await?;
        let mut method = [0u8; 2];
        stream.read_exact(&mut method).await?;
        if method != [SOCKS_VERSION, NO_AUTH] {
            return Err(SprintError::Proxy {
                endpoint: endpoint.to_string(),
                reason: format!("no acceptable auth method (got {:#04x})", method[1]),
            });
        }

        let mut request = vec![SOCKS_VERSION, CMD_CONNECT, RESERVED, ATYP_DOMAIN];
        request.push(host.len() as u8);
        request.extend_from_slice(host.as_bytes());
        request.extend_from_slice(&port.to_be_bytes());
        stream.write_all(&request).await?;

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await?;
        if reply[1] != 0x00 {
            return Err(SprintError::Proxy {
                endpoint: endpoint.to_string(),
                reason: reply_reason(reply[1]).to_string(),
            });
        }

        // Consume the bound address so the stream starts at the tunneled data.
        let addr_len = match reply[3] {
            ATYP_IPV4 => 4,
            ATYP_IPV6 => 16,
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await?;
                len[0] as usize
            }
            other => {
                return Err(SprintError::Proxy {
                    endpoint: endpoint.to_string(),
                    reason: format!("unknown address type {other:#04x}"),
                })
            }
        };
        let mut bound = vec![0u8; addr_len + 2];
        stream.read_exact(&mut bound).await?;
        Ok(())
    }
}

#[async_trait]
impl Dialer for Socks5Dialer {
    async fn dial(&self, endpoint: &str) -> Result<TcpStream> {
        let mut stream = connect(&self.proxy.address()).await?;
        timeout(CONNECT_TIMEOUT, self.handshake(&mut stream, endpoint))
            .await
            .map_err(|_| SprintError::Timeout(CONNECT_TIMEOUT))??;
        debug!("tunneled to {endpoint} via {}", self.proxy.address());
        Ok(stream)
    }
}

async fn connect(endpoint: &str) -> Result<TcpStream> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(endpoint))
        .await
        .map_err(|_| SprintError::Timeout(CONNECT_TIMEOUT))?
        .map_err(|source| SprintError::Dial {
            endpoint: endpoint.to_string(),
            source,
        })?;
    Ok(stream)
}

fn split_host_port(value: &str) -> Option<(&str, u16)> {
    let (host, port) = value.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host, port.parse().ok()?))
}

fn reply_reason(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_config_parses_host_port() {
        let proxy = ProxyConfig::parse("192.168.8.49:1080").unwrap();
        assert_eq!(proxy.address(), "192.168.8.49:1080");
        assert_eq!(proxy.socks_url(), "socks5://192.168.8.49:1080");
    }

    #[test]
    fn proxy_config_rejects_bad_addresses() {
        assert!(ProxyConfig::parse("no-port").is_err());
        assert!(ProxyConfig::parse(":1080").is_err());
        assert!(ProxyConfig::parse("host:notaport").is_err());
    }

    #[test]
    fn host_port_split_keeps_last_colon() {
        assert_eq!(split_host_port("example.net:8080"), Some(("example.net", 8080)));
        assert_eq!(split_host_port("example.net"), None);
    }
}
