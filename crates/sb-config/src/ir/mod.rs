//! Strongly-typed intermediate representation (IR) for load-balance groups.
//!
//! Field naming follows the Clash-style group options (`use`, `filter`,
//! `disable_udp`, `interface_name`, `routing_mark`); new fields extend without
//! changing default behavior.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Strategy used when the `strategy` key is absent.
pub const DEFAULT_STRATEGY: &str = "random";

/// Strategy names accepted by the balancer.
pub const SUPPORTED_STRATEGIES: &[&str] = &["random", "round-robin", "consistent-hashing"];

/// How long a computed backend pool is reused before providers are asked again.
pub const DEFAULT_REFRESH_TTL_MS: u64 = 5_000;

fn default_strategy() -> String {
    DEFAULT_STRATEGY.to_string()
}

fn default_refresh_ttl_ms() -> u64 {
    DEFAULT_REFRESH_TTL_MS
}

/// Options shared by every outbound group (name, UDP switch, socket binding, filter).
/// 所有出站组共享的选项。
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupCommonIR {
    /// Group name, also the name recorded in connection chains.
    pub name: String,
    /// Provider names, in declaration order.
    #[serde(rename = "use", alias = "providers", default)]
    pub providers: Vec<String>,
    /// Regex kept against backend names (unanchored search).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Report the group as not supporting UDP.
    #[serde(default)]
    pub disable_udp: bool,
    /// Bind outbound sockets to this interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    /// SO_MARK for outbound sockets; 0 behaves like unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_mark: Option<u32>,
}

/// A `load-balance` group as it appears in config.
/// 配置中的负载均衡组。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadBalanceIR {
    #[serde(flatten)]
    pub common: GroupCommonIR,
    /// `random` | `round-robin` | `consistent-hashing`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Single-flight window for backend pool refreshes.
    #[serde(default = "default_refresh_ttl_ms")]
    pub refresh_ttl_ms: u64,
    /// Upper bound on one pool refresh; unset waits for providers indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_timeout_ms: Option<u64>,
    /// Public suffix list file used for consistent-hashing affinity keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_suffix_list: Option<PathBuf>,
}

impl Default for LoadBalanceIR {
    fn default() -> Self {
        Self {
            common: GroupCommonIR::default(),
            strategy: default_strategy(),
            refresh_ttl_ms: DEFAULT_REFRESH_TTL_MS,
            refresh_timeout_ms: None,
            public_suffix_list: None,
        }
    }
}

impl LoadBalanceIR {
    pub fn name(&self) -> &str {
        &self.common.name
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_millis(self.refresh_ttl_ms)
    }

    pub fn refresh_timeout(&self) -> Option<Duration> {
        self.refresh_timeout_ms.map(Duration::from_millis)
    }

    /// Routing mark with the "0 means unset" convention applied.
    pub fn routing_mark(&self) -> Option<u32> {
        self.common.routing_mark.filter(|m| *m != 0)
    }

    /// Non-empty filter pattern, if any.
    pub fn filter(&self) -> Option<&str> {
        self.common.filter.as_deref().filter(|f| !f.is_empty())
    }

    /// Validate and collapse all findings into one error.
    pub fn validate(&self) -> anyhow::Result<()> {
        let issues = crate::validator::validate_load_balance(self);
        if issues.is_empty() {
            return Ok(());
        }
        let joined = issues
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(anyhow::anyhow!(
            "invalid load-balance group '{}': {}",
            self.common.name,
            joined
        ))
    }
}
