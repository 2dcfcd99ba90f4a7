//! 通用小工具
use std::path::PathBuf;

pub mod singledo;

/// 读取路径环境变量：未设置或为空时返回 None
pub fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::EnvVarGuard;

    #[test]
    fn test_env_path() {
        let _g = EnvVarGuard::set("SB_TEST_ENV_PATH", "/tmp/psl.dat");
        assert_eq!(env_path("SB_TEST_ENV_PATH"), Some(PathBuf::from("/tmp/psl.dat")));
        drop(_g);
        let _g = EnvVarGuard::set("SB_TEST_ENV_PATH", "");
        assert_eq!(env_path("SB_TEST_ENV_PATH"), None);
    }
}
