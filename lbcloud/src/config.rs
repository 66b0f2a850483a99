use std::path::PathBuf;
use std::time::Duration;

use crate::utils::identifier::DigestAlgorithm;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub root_dir: PathBuf,
    pub quota_bytes: u64,
    pub max_accounts: usize,
    pub save_debounce: Duration,
    pub cache_limit: usize,
    pub lock_timeout: Duration,
    pub digest: DigestAlgorithm,
}

impl Config {
    /// Configuration with the stock limits, rooted at `root_dir`.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            root_dir: root_dir.into(),
            quota_bytes: 32_000_000,
            max_accounts: 32,
            save_debounce: Duration::from_secs(4),
            cache_limit: 256,
            lock_timeout: Duration::from_secs(30),
            digest: DigestAlgorithm::Md5,
        }
    }

    /// Limit used for the capacity check right after the startup load.
    pub fn startup_cache_limit(&self) -> usize {
        (self.cache_limit / 2).max(1)
    }
}
