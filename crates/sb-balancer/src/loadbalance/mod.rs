//! Load-balance outbound group.
//! 负载均衡出站组
//!
//! Every new connection resolves the current backend pool (single-flight,
//! TTL-memoised), asks the configured [`Strategy`] for a backend, delegates the
//! dial to it and records the group name in the connection's chain.
//!
//! ```text
//! metadata -> LoadBalance -> PoolAggregator (snapshot) -> Strategy (index) -> Backend::connect_*
//! ```

pub mod affinity;
pub mod hash;
pub mod pool;
pub mod strategy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::adapter::{Backend, DialOptions, Provider, ProxyConn, ProxyPacketConn};
use crate::error::{Error, Result};
use crate::types::Metadata;
use affinity::SuffixResolver;
use pool::{Pool, PoolAggregator};
use strategy::{Strategy, StrategyKind};

/// Group kind reported by introspection.
pub const GROUP_TYPE: &str = "LoadBalance";

/// Default single-flight window for pool refreshes.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_millis(sb_config::ir::DEFAULT_REFRESH_TTL_MS);

/// Options shared with other outbound groups.
#[derive(Debug, Clone)]
pub struct GroupOptions {
    pub name: String,
    /// Backend name regex, unanchored.
    pub filter: Option<String>,
    pub disable_udp: bool,
    pub interface: Option<String>,
    pub routing_mark: Option<u32>,
    pub refresh_ttl: Duration,
    pub refresh_timeout: Option<Duration>,
}

impl GroupOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: None,
            disable_udp: false,
            interface: None,
            routing_mark: None,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            refresh_timeout: None,
        }
    }

    fn dial_options(&self) -> DialOptions {
        DialOptions {
            interface: self.interface.clone().filter(|i| !i.is_empty()),
            routing_mark: self.routing_mark.filter(|m| *m != 0),
        }
    }
}

/// `{"type": "LoadBalance", "all": [...]}` for status consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    /// Backend names in pool order.
    pub all: Vec<String>,
}

#[derive(Debug)]
pub struct LoadBalance {
    name: String,
    dial: DialOptions,
    disable_udp: bool,
    pool: PoolAggregator,
    strategy: Box<dyn Strategy>,
}

impl LoadBalance {
    /// Build a group; an unknown strategy name or a bad filter fails here, never at dial time.
    ///
    /// The public suffix list comes from `SB_PUBLIC_SUFFIX_LIST` when set.
    pub fn new(
        opts: GroupOptions,
        providers: Vec<Arc<dyn Provider>>,
        strategy: &str,
    ) -> Result<Self> {
        let suffixes = affinity::resolver_from(None)?;
        Self::with_suffixes(opts, providers, strategy, suffixes)
    }

    pub fn with_suffixes(
        opts: GroupOptions,
        providers: Vec<Arc<dyn Provider>>,
        strategy: &str,
        suffixes: Arc<dyn SuffixResolver>,
    ) -> Result<Self> {
        let kind: StrategyKind = strategy.parse()?;
        let pool = PoolAggregator::new(opts.name.clone(), providers, opts.refresh_ttl)
            .with_filter(opts.filter.as_deref())?
            .with_timeout(opts.refresh_timeout);
        debug!(
            target: "sb_balancer::loadbalance",
            group = %opts.name,
            strategy = %kind,
            providers = pool.providers().len(),
            "load-balance group created"
        );
        Ok(Self {
            dial: opts.dial_options(),
            name: opts.name,
            disable_udp: opts.disable_udp,
            pool,
            strategy: strategy::build(kind, suffixes),
        })
    }

    /// Build from config; `providers` must follow the IR's `use` order.
    pub fn from_ir(
        ir: &sb_config::LoadBalanceIR,
        providers: Vec<Arc<dyn Provider>>,
    ) -> Result<Self> {
        ir.validate().map_err(|e| Error::Config(e.to_string()))?;
        let declared = &ir.common.providers;
        let resolved = providers.iter().map(|p| p.name());
        if !declared.iter().map(String::as_str).eq(resolved) {
            return Err(Error::Config(format!(
                "group {}: providers do not match `use` ({})",
                ir.name(),
                declared.join(", ")
            )));
        }

        let suffixes = affinity::resolver_from(ir.public_suffix_list.as_deref())?;
        let opts = GroupOptions {
            name: ir.name().to_string(),
            filter: ir.filter().map(str::to_string),
            disable_udp: ir.common.disable_udp,
            interface: ir.common.interface_name.clone(),
            routing_mark: ir.routing_mark(),
            refresh_ttl: ir.refresh_ttl(),
            refresh_timeout: ir.refresh_timeout(),
        };
        Self::with_suffixes(opts, providers, &ir.strategy, suffixes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Options this group forces onto every dial.
    pub fn dial_options(&self) -> &DialOptions {
        &self.dial
    }

    pub fn supports_udp(&self) -> bool {
        !self.disable_udp
    }

    /// The backend that would carry a request for `metadata`, without dialing.
    pub async fn unwrap(&self, metadata: Option<&Metadata>) -> Result<Arc<dyn Backend>> {
        let pool = self.pool.get_pool(true).await?;
        self.pick(&pool, metadata)
    }

    fn pick(&self, pool: &Pool, metadata: Option<&Metadata>) -> Result<Arc<dyn Backend>> {
        let Some(backend) = self
            .strategy
            .select(pool, metadata)
            .and_then(|idx| pool.get(idx))
            .cloned()
        else {
            warn!(
                target: "sb_balancer::loadbalance",
                group = %self.name,
                "no backends in pool"
            );
            #[cfg(feature = "metrics")]
            metrics::counter!("lb_no_backend_total", "group" => self.name.clone()).increment(1);
            return Err(Error::no_backends(&self.name));
        };

        if !backend.is_alive() {
            warn!(
                target: "sb_balancer::loadbalance",
                group = %self.name,
                backend = %backend.name(),
                strategy = %self.strategy.kind(),
                "no live backend, falling back to first in pool"
            );
        }
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "lb_select_total",
            "group" => self.name.clone(),
            "strategy" => self.strategy.kind().as_str()
        )
        .increment(1);
        Ok(backend)
    }

    /// Open a stream through the selected backend; its error is returned unchanged.
    pub async fn dial(&self, metadata: &Metadata, opts: DialOptions) -> Result<ProxyConn> {
        let backend = self.unwrap(Some(metadata)).await?;
        let opts = opts.merged_with(&self.dial);
        debug!(
            target: "sb_balancer::loadbalance",
            group = %self.name,
            backend = %backend.name(),
            dst = %metadata.remote_address(),
            "dial via backend"
        );
        match backend.connect_stream(metadata, &opts).await {
            Ok(mut conn) => {
                conn.append_to_chains(&self.name);
                Ok(conn)
            }
            Err(e) => {
                debug!(
                    target: "sb_balancer::loadbalance",
                    group = %self.name,
                    backend = %backend.name(),
                    error = %e,
                    "backend dial failed"
                );
                Err(e)
            }
        }
    }

    /// Datagram counterpart of [`dial`](Self::dial).
    ///
    /// Delegates even when UDP is disabled; that flag is only reported by
    /// [`supports_udp`](Self::supports_udp).
    pub async fn listen_packet(
        &self,
        metadata: &Metadata,
        opts: DialOptions,
    ) -> Result<ProxyPacketConn> {
        let backend = self.unwrap(Some(metadata)).await?;
        let opts = opts.merged_with(&self.dial);
        debug!(
            target: "sb_balancer::loadbalance",
            group = %self.name,
            backend = %backend.name(),
            dst = %metadata.remote_address(),
            "listen via backend"
        );
        match backend.connect_datagram(metadata, &opts).await {
            Ok(mut pc) => {
                pc.append_to_chains(&self.name);
                Ok(pc)
            }
            Err(e) => {
                debug!(
                    target: "sb_balancer::loadbalance",
                    group = %self.name,
                    backend = %backend.name(),
                    error = %e,
                    "backend listen failed"
                );
                Err(e)
            }
        }
    }

    /// Current pool for status output; providers are not touched.
    pub async fn describe(&self) -> Result<GroupSnapshot> {
        let pool = self.pool.get_pool(false).await?;
        Ok(GroupSnapshot {
            kind: GROUP_TYPE.to_string(),
            all: pool.iter().map(|b| b.name().to_string()).collect(),
        })
    }

    pub async fn to_json(&self) -> Result<serde_json::Value> {
        let snapshot = self.describe().await?;
        serde_json::to_value(&snapshot).map_err(|e| Error::Io(e.into()))
    }

    /// Forget the memoised pool; the next selection re-enumerates providers.
    pub fn refresh(&self) {
        self.pool.invalidate();
    }
}

/// A group is itself a backend, so groups nest.
#[async_trait]
impl Backend for LoadBalance {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        true
    }

    async fn connect_stream(&self, metadata: &Metadata, opts: &DialOptions) -> Result<ProxyConn> {
        self.dial(metadata, opts.clone()).await
    }

    async fn connect_datagram(
        &self,
        metadata: &Metadata,
        opts: &DialOptions,
    ) -> Result<ProxyPacketConn> {
        self.listen_packet(metadata, opts.clone()).await
    }
}
