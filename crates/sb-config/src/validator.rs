//! Validation rules for load-balance groups.
//! 负载均衡组的校验规则。
use crate::ir::{LoadBalanceIR, SUPPORTED_STRATEGIES};
use sb_types::{Issue, IssueCode};
use std::collections::HashSet;

/// Top-level keys a load-balance group accepts (`type` is the caller's dispatch key).
pub const KNOWN_KEYS: &[&str] = &[
    "type",
    "name",
    "use",
    "providers",
    "filter",
    "disable_udp",
    "interface_name",
    "routing_mark",
    "strategy",
    "refresh_ttl_ms",
    "refresh_timeout_ms",
    "public_suffix_list",
];

/// Report every top-level key of a raw group object outside [`KNOWN_KEYS`].
pub fn unknown_keys(raw: &serde_json::Value) -> Vec<Issue> {
    let Some(obj) = raw.as_object() else {
        return Vec::new();
    };
    obj.keys()
        .filter(|k| !KNOWN_KEYS.contains(&k.as_str()))
        .map(|k| {
            Issue::new(
                IssueCode::UnknownField,
                format!("/{}", k),
                format!("unknown field '{}'", k),
            )
        })
        .collect()
}

/// Collect every problem with `ir`; an empty list means the group can be built.
pub fn validate_load_balance(ir: &LoadBalanceIR) -> Vec<Issue> {
    let mut issues = Vec::new();

    if ir.common.name.trim().is_empty() {
        issues.push(Issue::new(
            IssueCode::MissingRequired,
            "/name",
            "group name must not be empty",
        ));
    }

    if !SUPPORTED_STRATEGIES.contains(&ir.strategy.as_str()) {
        issues.push(
            Issue::new(
                IssueCode::InvalidEnum,
                "/strategy",
                format!("unsupported strategy: {}", ir.strategy),
            )
            .with_hint(format!("expected one of {}", SUPPORTED_STRATEGIES.join(", "))),
        );
    }

    if ir.common.providers.is_empty() {
        issues.push(Issue::new(
            IssueCode::MissingRequired,
            "/use",
            "group needs at least one provider",
        ));
    }

    let mut seen = HashSet::new();
    for (i, p) in ir.common.providers.iter().enumerate() {
        if !seen.insert(p.as_str()) {
            issues.push(Issue::new(
                IssueCode::DuplicateTag,
                format!("/use/{}", i),
                format!("provider '{}' listed more than once", p),
            ));
        }
    }

    if let Some(pattern) = ir.filter() {
        if let Err(e) = regex::Regex::new(pattern) {
            issues.push(Issue::new(
                IssueCode::TypeMismatch,
                "/filter",
                format!("filter is not a valid regex: {}", e),
            ));
        }
    }

    if ir.refresh_ttl_ms == 0 {
        issues.push(Issue::new(
            IssueCode::RangeExceeded,
            "/refresh_ttl_ms",
            "refresh window must be greater than zero",
        ));
    }

    if ir.refresh_timeout_ms == Some(0) {
        issues.push(Issue::new(
            IssueCode::RangeExceeded,
            "/refresh_timeout_ms",
            "refresh timeout must be greater than zero",
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::GroupCommonIR;

    fn group(strategy: &str) -> LoadBalanceIR {
        LoadBalanceIR {
            common: GroupCommonIR {
                name: "lb".into(),
                providers: vec!["sub".into()],
                ..Default::default()
            },
            strategy: strategy.into(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_group_has_no_issues() {
        for s in SUPPORTED_STRATEGIES {
            assert!(validate_load_balance(&group(s)).is_empty(), "{s}");
        }
    }

    #[test]
    fn unknown_strategy_is_invalid_enum() {
        let issues = validate_load_balance(&group("least-load"));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::InvalidEnum);
        assert_eq!(issues[0].ptr, "/strategy");
        assert!(issues[0].msg.contains("least-load"));
    }

    #[test]
    fn bad_filter_and_zero_ttl_reported_together() {
        let mut ir = group("random");
        ir.common.filter = Some("([".into());
        ir.refresh_ttl_ms = 0;
        let codes: Vec<_> = validate_load_balance(&ir)
            .into_iter()
            .map(|i| (i.code, i.ptr))
            .collect();
        assert_eq!(
            codes,
            vec![
                (IssueCode::TypeMismatch, "/filter".to_string()),
                (IssueCode::RangeExceeded, "/refresh_ttl_ms".to_string()),
            ]
        );
    }

    #[test]
    fn missing_name_and_providers() {
        let ir = LoadBalanceIR::default();
        let ptrs: Vec<_> = validate_load_balance(&ir).into_iter().map(|i| i.ptr).collect();
        assert_eq!(ptrs, vec!["/name", "/use"]);
        assert!(ir.validate().is_err());
    }

    #[test]
    fn duplicate_provider_flagged() {
        let mut ir = group("round-robin");
        ir.common.providers = vec!["a".into(), "b".into(), "a".into()];
        let issues = validate_load_balance(&ir);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::DuplicateTag);
        assert_eq!(issues[0].ptr, "/use/2");
    }

    #[test]
    fn load_from_value_rejects_invalid() {
        let err = crate::load_balance_from_value(serde_json::json!({
            "name": "lb",
            "use": ["p"],
            "strategy": "sticky"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unsupported strategy: sticky"));

        let ok = crate::load_balance_from_value(serde_json::json!({
            "name": "lb",
            "use": ["p"]
        }))
        .unwrap();
        assert_eq!(ok.strategy, "random");
    }

    #[test]
    fn unknown_keys_reported_with_pointer() {
        let raw = serde_json::json!({
            "type": "load-balance",
            "name": "lb",
            "use": ["p"],
            "stratgey": "round-robin"
        });
        let issues = unknown_keys(&raw);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::UnknownField);
        assert_eq!(issues[0].ptr, "/stratgey");

        let err = crate::load_balance_from_value(raw).unwrap_err();
        assert!(err.to_string().contains("unknown field 'stratgey'"), "{err}");
    }
}
