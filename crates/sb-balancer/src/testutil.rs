use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::adapter::{Backend, DialOptions, PacketChannel, Provider, ProxyConn, ProxyPacketConn};
use crate::error::{Error, Result};
use crate::types::Metadata;

fn env_lock() -> ReentrantMutexGuard<'static, ()> {
    static LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| ReentrantMutex::new(())).lock()
}

pub(crate) struct EnvVarGuard {
    _lock: ReentrantMutexGuard<'static, ()>,
    key: &'static str,
    prev: Option<String>,
}

impl EnvVarGuard {
    pub(crate) fn set(key: &'static str, value: &str) -> Self {
        let lock = env_lock();
        let prev = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self {
            _lock: lock,
            key,
            prev,
        }
    }

    pub(crate) fn remove(key: &'static str) -> Self {
        let lock = env_lock();
        let prev = std::env::var(key).ok();
        std::env::remove_var(key);
        Self {
            _lock: lock,
            key,
            prev,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(prev) => std::env::set_var(self.key, prev),
            None => std::env::remove_var(self.key),
        }
    }
}

/// In-crate backend stub: liveness can be flipped, dials are counted,
/// streams are backed by `tokio::io::duplex`.
#[derive(Debug)]
pub(crate) struct StubBackend {
    name: String,
    alive: AtomicBool,
    fail: bool,
    pub(crate) dials: AtomicUsize,
    pub(crate) last_opts: Mutex<Option<DialOptions>>,
}

impl StubBackend {
    pub(crate) fn new(name: &str, alive: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            alive: AtomicBool::new(alive),
            fail: false,
            dials: AtomicUsize::new(0),
            last_opts: Mutex::new(None),
        })
    }

    pub(crate) fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            alive: AtomicBool::new(true),
            fail: true,
            dials: AtomicUsize::new(0),
            last_opts: Mutex::new(None),
        })
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    fn record(&self, opts: &DialOptions) -> Result<()> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        *self.last_opts.lock() = Some(opts.clone());
        if self.fail {
            return Err(Error::backend(&self.name, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn connect_stream(&self, _metadata: &Metadata, opts: &DialOptions) -> Result<ProxyConn> {
        self.record(opts)?;
        let (client, _server) = tokio::io::duplex(1024);
        Ok(ProxyConn::new(Box::new(client), self.name.clone()))
    }

    async fn connect_datagram(
        &self,
        _metadata: &Metadata,
        opts: &DialOptions,
    ) -> Result<ProxyPacketConn> {
        self.record(opts)?;
        Ok(ProxyPacketConn::new(Box::new(NullPacket), self.name.clone()))
    }
}

#[derive(Debug)]
struct NullPacket;

#[async_trait]
impl PacketChannel for NullPacket {
    async fn send_to(&self, buf: &[u8], _dst: SocketAddr) -> io::Result<usize> {
        Ok(buf.len())
    }

    async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "no packets"))
    }
}

/// Provider stub over a fixed list; counts `list()` and `touch()` calls.
pub(crate) struct StubProvider {
    name: String,
    backends: Mutex<Vec<Arc<dyn Backend>>>,
    delay: Duration,
    fail: bool,
    pub(crate) lists: AtomicUsize,
    pub(crate) touches: AtomicUsize,
}

impl StubProvider {
    pub(crate) fn new(name: &str, backends: Vec<Arc<dyn Backend>>) -> Arc<Self> {
        Self::build(name, backends, Duration::ZERO, false)
    }

    pub(crate) fn slow(name: &str, backends: Vec<Arc<dyn Backend>>, delay: Duration) -> Arc<Self> {
        Self::build(name, backends, delay, false)
    }

    pub(crate) fn broken(name: &str) -> Arc<Self> {
        Self::build(name, Vec::new(), Duration::ZERO, true)
    }

    fn build(
        name: &str,
        backends: Vec<Arc<dyn Backend>>,
        delay: Duration,
        fail: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            backends: Mutex::new(backends),
            delay,
            fail,
            lists: AtomicUsize::new(0),
            touches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn replace(&self, backends: Vec<Arc<dyn Backend>>) {
        *self.backends.lock() = backends;
    }
}

impl fmt::Debug for StubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubProvider").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self) -> Result<Vec<Arc<dyn Backend>>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::Config(format!("provider {} unreachable", self.name)));
        }
        Ok(self.backends.lock().clone())
    }

    fn touch(&self) {
        self.touches.fetch_add(1, Ordering::SeqCst);
    }
}

/// Upcast a list of stubs for the strategy tests.
pub(crate) fn pool_of(stubs: &[Arc<StubBackend>]) -> Vec<Arc<dyn Backend>> {
    stubs
        .iter()
        .map(|s| Arc::clone(s) as Arc<dyn Backend>)
        .collect()
}
