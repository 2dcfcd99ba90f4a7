//! Connections returned by backends, tagged with the adapters they went through.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Combined trait for async read + write + unpin + send.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Adapter names a connection passed through, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain(Vec<String>);

impl Chain {
    pub fn new(first: impl Into<String>) -> Self {
        Self(vec![first.into()])
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.0.push(name.into());
    }

    /// Outermost adapter.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `outer[inner]` once there is more than one hop.
impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [only] => f.write_str(only),
            [first, .., last] => write!(f, "{}[{}]", last, first),
        }
    }
}

/// Stream connection plus its chain.
pub struct ProxyConn {
    inner: BoxedStream,
    chain: Chain,
}

impl ProxyConn {
    /// Wrap a stream opened by the adapter called `adapter`.
    pub fn new(inner: BoxedStream, adapter: impl Into<String>) -> Self {
        Self {
            inner,
            chain: Chain::new(adapter),
        }
    }

    pub fn chains(&self) -> &Chain {
        &self.chain
    }

    pub fn append_to_chains(&mut self, adapter: impl Into<String>) {
        self.chain.push(adapter);
    }
}

impl fmt::Debug for ProxyConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConn")
            .field("chain", &self.chain)
            .finish()
    }
}

impl AsyncRead for ProxyConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProxyConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Packet-level channel opened through a backend.
#[async_trait]
pub trait PacketChannel: Send + Sync + fmt::Debug {
    async fn send_to(&self, buf: &[u8], dst: SocketAddr) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Default implementation does nothing (stateless UDP).
    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Packet channel plus its chain.
#[derive(Debug)]
pub struct ProxyPacketConn {
    inner: Box<dyn PacketChannel>,
    chain: Chain,
}

impl ProxyPacketConn {
    pub fn new(inner: Box<dyn PacketChannel>, adapter: impl Into<String>) -> Self {
        Self {
            inner,
            chain: Chain::new(adapter),
        }
    }

    pub fn chains(&self) -> &Chain {
        &self.chain
    }

    pub fn append_to_chains(&mut self, adapter: impl Into<String>) {
        self.chain.push(adapter);
    }

    pub async fn send_to(&self, buf: &[u8], dst: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dst).await
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    pub async fn close(&self) -> io::Result<()> {
        self.inner.close().await
    }
}
