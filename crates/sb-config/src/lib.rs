//! Typed configuration for load-balance outbound groups
//! 负载均衡出站组的类型化配置
//!
//! `Raw JSON` -> `LoadBalanceIR` (serde) -> `validate` -> `sb-balancer` builds the adapter.
//! Reading files and merging whole router configs is the caller's job; this crate
//! only owns the group's option shape, its defaults and its validation rules.
//! 本 crate 只负责组选项的结构、默认值与校验规则，不负责读取文件。
//!
//! ## Key Modules / 关键模块
//! - [`ir`]: the group options as deserialised from config.
//! - [`validator`]: turns an IR into a list of [`sb_types::Issue`]s.

pub mod ir;
pub mod validator;

pub use ir::LoadBalanceIR;
pub use validator::{unknown_keys, validate_load_balance};

/// Parse a single load-balance group from a JSON value.
/// 从 JSON 值解析单个负载均衡组。
///
/// Keys the group does not understand are rejected before deserialising.
pub fn load_balance_from_value(v: serde_json::Value) -> anyhow::Result<LoadBalanceIR> {
    let unknown = unknown_keys(&v);
    if !unknown.is_empty() {
        let joined = unknown
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("invalid load-balance group: {}", joined);
    }
    let ir: LoadBalanceIR = serde_json::from_value(v)?;
    ir.validate()?;
    Ok(ir)
}
