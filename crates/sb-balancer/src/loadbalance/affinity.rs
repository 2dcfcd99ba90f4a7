//! Affinity key derivation for consistent hashing.
//!
//! Key order: literal IP host as-is, then the host's registrable domain
//! (eTLD+1), then the pre-resolved destination IP, then `""`.
//! The public-suffix data is injected through [`SuffixResolver`] so tests
//! and operators can swap the list without touching global state.

use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use publicsuffix::{List, Psl};

use crate::error::{Error, Result};
use crate::types::Metadata;
use crate::util::env_path;

/// Env override for the public suffix list file.
pub const PSL_ENV: &str = "SB_PUBLIC_SUFFIX_LIST";

/// Computes the registrable domain ("eTLD+1") of a normalised host name.
pub trait SuffixResolver: Send + Sync + fmt::Debug {
    /// `None` when `host` is itself a public suffix or has no known suffix.
    fn registrable_domain(&self, host: &str) -> Option<String>;
}

/// Suffix data compiled into the binary (`psl` crate).
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSuffixes;

impl SuffixResolver for BuiltinSuffixes {
    fn registrable_domain(&self, host: &str) -> Option<String> {
        psl::domain_str(host).map(str::to_string)
    }
}

/// Suffix data loaded from a `public_suffix_list.dat` file.
pub struct PublicSuffixList {
    list: List,
}

impl PublicSuffixList {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let list = List::from_bytes(bytes)
            .map_err(|e| Error::Config(format!("invalid public suffix list: {e}")))?;
        Ok(Self { list })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PublicSuffixList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicSuffixList").finish_non_exhaustive()
    }
}

impl SuffixResolver for PublicSuffixList {
    fn registrable_domain(&self, host: &str) -> Option<String> {
        let domain = self.list.domain(host.as_bytes())?;
        std::str::from_utf8(domain.as_bytes())
            .ok()
            .map(str::to_string)
    }
}

/// Pick the resolver: explicit path, then `SB_PUBLIC_SUFFIX_LIST`, then built-in.
///
/// A configured file that cannot be read or parsed is an error, not a silent
/// fallback.
pub fn resolver_from(path: Option<&Path>) -> Result<Arc<dyn SuffixResolver>> {
    let path = path.map(Path::to_path_buf).or_else(|| env_path(PSL_ENV));
    match path {
        Some(p) => {
            let list = PublicSuffixList::from_path(&p)?;
            tracing::debug!(
                target: "sb_balancer::loadbalance",
                path = %p.display(),
                "loaded public suffix list"
            );
            Ok(Arc::new(list))
        }
        None => Ok(Arc::new(BuiltinSuffixes)),
    }
}

// 小写化；空标签（首尾点、连续点）视为无效域名
fn normalize_host(host: &str) -> Option<String> {
    if host.is_empty() || host.starts_with('.') || host.ends_with('.') || host.contains("..") {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// Derive the consistent-hash input for a request.
pub fn derive_key(metadata: Option<&Metadata>, suffixes: &dyn SuffixResolver) -> String {
    let Some(md) = metadata else {
        return String::new();
    };

    if !md.host.is_empty() {
        if md.host.parse::<IpAddr>().is_ok() {
            return md.host.clone();
        }
        if let Some(domain) =
            normalize_host(&md.host).and_then(|h| suffixes.registrable_domain(&h))
        {
            return domain;
        }
    }

    md.dst_ip.map(|ip| ip.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::EnvVarGuard;
    use std::io::Write;
    use std::net::Ipv4Addr;

    const MINI_PSL: &[u8] = b"// ===BEGIN ICANN DOMAINS===\ncom\nuk\nco.uk\n// ===END ICANN DOMAINS===\n";

    fn key(host: &str) -> String {
        derive_key(Some(&Metadata::tcp(host, 443)), &BuiltinSuffixes)
    }

    #[test]
    fn subdomains_share_registrable_domain() {
        assert_eq!(key("sub.example.com"), "example.com");
        assert_eq!(key("other.example.com"), "example.com");
        assert_eq!(key("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(key("WWW.Example.COM"), "example.com");
    }

    #[test]
    fn literal_ip_host_is_kept() {
        assert_eq!(key("203.0.113.5"), "203.0.113.5");
        assert_eq!(key("2001:db8::1"), "2001:db8::1");
    }

    #[test]
    fn missing_metadata_yields_empty_key() {
        assert_eq!(derive_key(None, &BuiltinSuffixes), "");
    }

    #[test]
    fn falls_back_to_destination_ip() {
        let dst = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));

        let md = Metadata::tcp("", 80).with_dst_ip(dst);
        assert_eq!(derive_key(Some(&md), &BuiltinSuffixes), "198.51.100.7");

        // 非法域名（空标签）走目标 IP
        let md = Metadata::tcp("a..example.com", 80).with_dst_ip(dst);
        assert_eq!(derive_key(Some(&md), &BuiltinSuffixes), "198.51.100.7");

        let md = Metadata::tcp("example.com.", 80).with_dst_ip(dst);
        assert_eq!(derive_key(Some(&md), &BuiltinSuffixes), "198.51.100.7");
    }

    #[test]
    fn suffix_only_host_without_ip_is_empty() {
        assert_eq!(key("com"), "");
        assert_eq!(key("localhost"), "");
    }

    #[test]
    fn deterministic() {
        for host in ["sub.example.com", "203.0.113.5", "a.b.example.co.uk"] {
            assert_eq!(key(host), key(host));
        }
    }

    #[test]
    fn list_from_bytes() {
        let list = PublicSuffixList::from_bytes(MINI_PSL).unwrap();
        let md = Metadata::tcp("a.b.example.co.uk", 443);
        assert_eq!(derive_key(Some(&md), &list), "example.co.uk");
        let md = Metadata::tcp("cdn.example.com", 443);
        assert_eq!(derive_key(Some(&md), &list), "example.com");
    }

    #[test]
    fn resolver_prefers_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINI_PSL).unwrap();
        let _g = EnvVarGuard::remove(PSL_ENV);

        let resolver = resolver_from(Some(file.path())).unwrap();
        assert_eq!(
            resolver.registrable_domain("x.example.co.uk").as_deref(),
            Some("example.co.uk")
        );
    }

    #[test]
    fn resolver_reads_env_then_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINI_PSL).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        {
            let _g = EnvVarGuard::set(PSL_ENV, &path);
            let resolver = resolver_from(None).unwrap();
            assert!(format!("{resolver:?}").starts_with("PublicSuffixList"));
        }

        let _g = EnvVarGuard::remove(PSL_ENV);
        let resolver = resolver_from(None).unwrap();
        assert!(format!("{resolver:?}").starts_with("BuiltinSuffixes"));
    }

    #[test]
    fn missing_list_file_is_an_error() {
        let err = resolver_from(Some(Path::new("/nonexistent/psl.dat"))).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
