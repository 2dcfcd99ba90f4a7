//! Backend pool aggregation behind a single-flight memo.
//!
//! Providers are enumerated in declaration order, backends keep their
//! in-provider order, duplicate names keep the first occurrence and the optional
//! name filter is applied last. All concurrent callers inside the TTL window
//! share one enumeration (and its error).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::adapter::{Backend, Provider};
use crate::error::{Error, PoolError, Result};
use crate::util::singledo::Single;

/// Immutable pool snapshot, replaced wholesale on refresh.
pub type Pool = Arc<[Arc<dyn Backend>]>;

#[derive(Debug)]
pub struct PoolAggregator {
    group: String,
    providers: Arc<[Arc<dyn Provider>]>,
    filter: Option<Regex>,
    timeout: Option<Duration>,
    single: Single<Pool, PoolError>,
}

impl PoolAggregator {
    pub fn new(
        group: impl Into<String>,
        providers: Vec<Arc<dyn Provider>>,
        ttl: Duration,
    ) -> Self {
        Self {
            group: group.into(),
            providers: providers.into(),
            filter: None,
            timeout: None,
            single: Single::new(ttl),
        }
    }

    /// Keep only backends whose name matches `pattern` (unanchored). Empty means no filter.
    pub fn with_filter(mut self, pattern: Option<&str>) -> Result<Self> {
        self.filter = match pattern.filter(|p| !p.is_empty()) {
            Some(p) => Some(Regex::new(p).map_err(|e| Error::InvalidFilter {
                pattern: p.to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        Ok(self)
    }

    /// Bound every enumeration; a provider that hangs past it fails the refresh.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Current snapshot; `touch` forwards to every provider's `touch()` on refresh.
    pub async fn get_pool(&self, touch: bool) -> std::result::Result<Pool, PoolError> {
        let providers = Arc::clone(&self.providers);
        let filter = self.filter.clone();
        let timeout = self.timeout;
        let (res, shared) = self
            .single
            .run(move || async move {
                let collect = collect(providers, filter, touch);
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, collect).await {
                        Ok(res) => res,
                        Err(_) => Err(PoolError::Timeout(limit)),
                    },
                    None => collect.await,
                }
            })
            .await;

        match &res {
            Ok(pool) => tracing::debug!(
                target: "sb_balancer::loadbalance",
                group = %self.group,
                size = pool.len(),
                shared,
                "backend pool ready"
            ),
            Err(e) => tracing::debug!(
                target: "sb_balancer::loadbalance",
                group = %self.group,
                shared,
                error = %e,
                "backend pool refresh failed"
            ),
        }
        #[cfg(feature = "metrics")]
        {
            if !shared {
                let result = if res.is_ok() { "ok" } else { "error" };
                metrics::counter!(
                    "lb_pool_refresh_total",
                    "group" => self.group.clone(),
                    "result" => result
                )
                .increment(1);
            }
        }
        res
    }

    /// Drop the memoised snapshot so the next call re-enumerates.
    pub fn invalidate(&self) {
        self.single.reset();
    }
}

async fn collect(
    providers: Arc<[Arc<dyn Provider>]>,
    filter: Option<Regex>,
    touch: bool,
) -> std::result::Result<Pool, PoolError> {
    let mut seen = HashSet::new();
    let mut pool: Vec<Arc<dyn Backend>> = Vec::new();
    for provider in providers.iter() {
        if touch {
            provider.touch();
        }
        let backends = provider.list().await.map_err(|e| PoolError::Provider {
            provider: provider.name().to_string(),
            msg: e.to_string(),
        })?;
        for backend in backends {
            if !seen.insert(backend.name().to_string()) {
                continue;
            }
            if let Some(re) = &filter {
                if !re.is_match(backend.name()) {
                    continue;
                }
            }
            pool.push(backend);
        }
    }
    Ok(pool.into())
}
