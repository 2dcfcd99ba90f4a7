//! Capabilities the balancer consumes from the rest of the router.
//!
//! - [`Backend`]: one candidate outbound proxy (name, liveness, connect operations)
//! - [`Provider`]: a named source of backends, refreshed on its own schedule
//! - [`DialOptions`]: socket options forwarded to the chosen backend
//!
//! Concrete proxy adapters live elsewhere; nothing here downcasts to them.

use crate::error::Result;
use crate::types::Metadata;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

pub mod conn;

pub use conn::{AsyncStream, BoxedStream, Chain, PacketChannel, ProxyConn, ProxyPacketConn};

/// A candidate outbound proxy.
///
/// Liveness is owned by an out-of-band health checker and may flip at any time;
/// the balancer only reads it.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Stable name, used for filtering, dedup and connection chains.
    fn name(&self) -> &str;

    /// Last known health.
    fn is_alive(&self) -> bool;

    /// Open a stream to `metadata`'s destination through this backend.
    async fn connect_stream(&self, metadata: &Metadata, opts: &DialOptions) -> Result<ProxyConn>;

    /// Open a packet channel through this backend.
    async fn connect_datagram(
        &self,
        metadata: &Metadata,
        opts: &DialOptions,
    ) -> Result<ProxyPacketConn>;
}

/// A managed source of backends (static list, remote subscription, ...).
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Current backends, in the provider's own order.
    async fn list(&self) -> Result<Vec<Arc<dyn Backend>>>;

    /// Mark the provider as in use (e.g. to schedule lazy health checks).
    fn touch(&self) {}
}

/// Socket-level options applied when a backend dials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialOptions {
    /// Bind to this network interface.
    pub interface: Option<String>,
    /// SO_MARK for the outbound socket.
    pub routing_mark: Option<u32>,
}

impl DialOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    #[must_use]
    pub fn with_routing_mark(mut self, mark: u32) -> Self {
        self.routing_mark = Some(mark);
        self
    }

    /// Layer `group`'s options over `self`: every option the group sets wins.
    #[must_use]
    pub fn merged_with(mut self, group: &DialOptions) -> Self {
        if let Some(iface) = group.interface.as_ref().filter(|i| !i.is_empty()) {
            self.interface = Some(iface.clone());
        }
        if let Some(mark) = group.routing_mark.filter(|m| *m != 0) {
            self.routing_mark = Some(mark);
        }
        self
    }
}
