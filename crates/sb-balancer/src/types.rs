//! Request metadata handed to outbound selection.
//!
//! One `Metadata` describes one connection: network, inbound kind, source,
//! destination (domain and/or resolved IP) and the inbound listener address.

use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Network protocol type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

/// Inbound kind the connection arrived through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnType {
    #[default]
    Http,
    HttpConnect,
    Socks4,
    Socks5,
    Shadowsocks,
    Redir,
    TProxy,
    TcpTun,
    UdpTun,
    MtProxy,
    Dns,
}

impl ConnType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnType::Http => "HTTP",
            ConnType::HttpConnect => "HTTP Connect",
            ConnType::Socks4 => "Socks4",
            ConnType::Socks5 => "Socks5",
            ConnType::Shadowsocks => "ShadowSocks",
            ConnType::Redir => "Redir",
            ConnType::TProxy => "TProxy",
            ConnType::TcpTun => "TcpTun",
            ConnType::UdpTun => "UdpTun",
            ConnType::MtProxy => "MTProxy",
            ConnType::Dns => "DNS",
        }
    }
}

impl fmt::Display for ConnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnType {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Ports go out as decimal strings in the JSON view.
fn port_as_string<S: serde::Serializer>(port: &u16, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(port)
}

/// Per-connection descriptor. Never mutated by selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub network: Network,
    #[serde(rename = "type")]
    pub conn_type: ConnType,
    #[serde(rename = "sourceIP")]
    pub src_ip: Option<IpAddr>,
    #[serde(rename = "destinationIP")]
    pub dst_ip: Option<IpAddr>,
    #[serde(rename = "sourcePort", serialize_with = "port_as_string")]
    pub src_port: u16,
    #[serde(rename = "destinationPort", serialize_with = "port_as_string")]
    pub dst_port: u16,
    #[serde(rename = "inboundIP")]
    pub in_ip: Option<IpAddr>,
    #[serde(rename = "inboundPort", serialize_with = "port_as_string")]
    pub in_port: u16,
    /// Destination host as requested: a domain or an IP literal. Empty when unknown.
    pub host: String,
}

impl Metadata {
    /// TCP metadata for `host:port`.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            network: Network::Tcp,
            host: host.into(),
            dst_port: port,
            ..Default::default()
        }
    }

    /// UDP metadata for `host:port`.
    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self {
            network: Network::Udp,
            host: host.into(),
            dst_port: port,
            ..Default::default()
        }
    }

    pub fn with_dst_ip(mut self, ip: IpAddr) -> Self {
        self.dst_ip = Some(ip);
        self
    }

    pub fn with_source(mut self, src: SocketAddr) -> Self {
        self.src_ip = Some(src.ip());
        self.src_port = src.port();
        self
    }

    pub fn with_conn_type(mut self, conn_type: ConnType) -> Self {
        self.conn_type = conn_type;
        self
    }

    /// `host:port` of the destination, bracketing IPv6 literals.
    pub fn remote_address(&self) -> String {
        join_host_port(&self.to_string(), self.dst_port)
    }

    /// `ip:port` of the client, or the inbound kind when the source is unknown.
    pub fn source_address(&self) -> String {
        match self.src_ip {
            Some(ip) => SocketAddr::new(ip, self.src_port).to_string(),
            None => self.conn_type.to_string(),
        }
    }

    /// Destination IP already known (no DNS needed).
    pub fn resolved(&self) -> bool {
        self.dst_ip.is_some()
    }

    /// Has either a host or a destination IP.
    pub fn valid(&self) -> bool {
        !self.host.is_empty() || self.dst_ip.is_some()
    }

    /// Datagram destination; only for resolved UDP metadata.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        if self.network != Network::Udp {
            return None;
        }
        self.dst_ip.map(|ip| SocketAddr::new(ip, self.dst_port))
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.host.is_empty() {
            f.write_str(&self.host)
        } else if let Some(ip) = self.dst_ip {
            write!(f, "{}", ip)
        } else {
            f.write_str("<nil>")
        }
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
