//! Load-balancing outbound group for the router.
//! 负载均衡出站组：按策略从多个后端代理中选择一个承载连接。
//!
//! ## Key Modules / 关键模块
//! - [`adapter`]: `Backend` / `Provider` capabilities and connection wrappers with adapter chains.
//! - [`loadbalance`]: strategies, consistent-hash affinity, pool aggregation and the `LoadBalance` group.
//! - [`types`]: per-connection request metadata.
//! - [`util`]: single-flight helper.

pub mod adapter;
pub mod error;
pub mod loadbalance;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod testutil;

pub use adapter::{Backend, Chain, DialOptions, Provider, ProxyConn, ProxyPacketConn};
pub use error::{Error, PoolError, Result};
pub use loadbalance::strategy::StrategyKind;
pub use loadbalance::{GroupOptions, GroupSnapshot, LoadBalance};
pub use types::{ConnType, Metadata, Network};
