//! Mock backends and providers.
//!
//! Streams are `tokio::io::duplex` pairs whose far end echoes everything back,
//! packet channels loop datagrams back to the sender. Nothing touches the network.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sb_balancer::adapter::{
    Backend, DialOptions, PacketChannel, Provider, ProxyConn, ProxyPacketConn,
};
use sb_balancer::{Error, Metadata, Result};

/// Backend whose liveness and failure mode can be flipped at runtime.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    alive: AtomicBool,
    refuse: AtomicBool,
    dials: AtomicUsize,
    last_opts: Mutex<Option<DialOptions>>,
    last_dst: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn new(name: &str, alive: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            alive: AtomicBool::new(alive),
            refuse: AtomicBool::new(false),
            dials: AtomicUsize::new(0),
            last_opts: Mutex::new(None),
            last_dst: Mutex::new(None),
        })
    }

    pub fn alive(name: &str) -> Arc<Self> {
        Self::new(name, true)
    }

    pub fn dead(name: &str) -> Arc<Self> {
        Self::new(name, false)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Make every following connect fail with a backend error.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn last_opts(&self) -> Option<DialOptions> {
        self.last_opts.lock().clone()
    }

    /// `host:port` of the last request this backend saw.
    pub fn last_dst(&self) -> Option<String> {
        self.last_dst.lock().clone()
    }

    fn record(&self, metadata: &Metadata, opts: &DialOptions) -> Result<()> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        *self.last_opts.lock() = Some(opts.clone());
        *self.last_dst.lock() = Some(metadata.remote_address());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::backend(&self.name, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn connect_stream(&self, metadata: &Metadata, opts: &DialOptions) -> Result<ProxyConn> {
        self.record(metadata, opts)?;
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let (mut r, mut w) = tokio::io::split(server);
            let _ = tokio::io::copy(&mut r, &mut w).await;
        });
        Ok(ProxyConn::new(Box::new(client), self.name.clone()))
    }

    async fn connect_datagram(
        &self,
        metadata: &Metadata,
        opts: &DialOptions,
    ) -> Result<ProxyPacketConn> {
        self.record(metadata, opts)?;
        Ok(ProxyPacketConn::new(
            Box::new(MockPacketChannel::default()),
            self.name.clone(),
        ))
    }
}

/// Loops every datagram back, reporting the destination as the sender.
#[derive(Debug, Default)]
pub struct MockPacketChannel {
    queue: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
}

#[async_trait]
impl PacketChannel for MockPacketChannel {
    async fn send_to(&self, buf: &[u8], dst: SocketAddr) -> io::Result<usize> {
        self.queue.lock().push_back((buf.to_vec(), dst));
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (data, from) = self
            .queue
            .lock()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no datagram queued"))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok((n, from))
    }
}

/// Static provider; the list can be swapped to simulate a subscription update.
pub struct MockProvider {
    name: String,
    backends: RwLock<Vec<Arc<dyn Backend>>>,
    touches: AtomicUsize,
}

impl MockProvider {
    pub fn new<B>(name: &str, backends: Vec<Arc<B>>) -> Arc<Self>
    where
        B: Backend + 'static,
    {
        Self::from_dyn(name, upcast(backends))
    }

    pub fn from_dyn(name: &str, backends: Vec<Arc<dyn Backend>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            backends: RwLock::new(backends),
            touches: AtomicUsize::new(0),
        })
    }

    pub fn set_backends(&self, backends: Vec<Arc<dyn Backend>>) {
        *self.backends.write() = backends;
    }

    pub fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("name", &self.name)
            .field("backends", &self.backends.read().len())
            .finish()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self) -> Result<Vec<Arc<dyn Backend>>> {
        Ok(self.backends.read().clone())
    }

    fn touch(&self) {
        self.touches.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider that sleeps before answering and counts enumerations.
#[derive(Debug)]
pub struct CountingProvider {
    inner: Arc<MockProvider>,
    delay: Duration,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl CountingProvider {
    pub fn new(inner: Arc<MockProvider>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delay,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following enumeration fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for CountingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn list(&self) -> Result<Vec<Arc<dyn Backend>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "subscription fetch failed",
            )));
        }
        self.inner.list().await
    }

    fn touch(&self) {
        self.inner.touch();
    }
}

/// `Vec<Arc<T>>` to `Vec<Arc<dyn Backend>>`.
pub fn upcast<B>(backends: Vec<Arc<B>>) -> Vec<Arc<dyn Backend>>
where
    B: Backend + 'static,
{
    backends
        .into_iter()
        .map(|b| b as Arc<dyn Backend>)
        .collect()
}
