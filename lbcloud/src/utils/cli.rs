use clap::Parser;

use crate::utils::identifier::DigestAlgorithm;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Listening host
    #[arg(long, env = "LBCLOUD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Listening port
    #[arg(short, long, env = "LBCLOUD_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Root path holding `user_db.json` and `userfs/`
    #[arg(long, env = "LBCLOUD_ROOTDIR", default_value = ".")]
    pub root: String,

    /// Maximum aggregate payload bytes per account
    #[arg(long, env = "LBCLOUD_QUOTA_BYTES", default_value_t = 32_000_000)]
    pub quota_bytes: u64,

    /// Maximum number of registered accounts
    #[arg(long, env = "LBCLOUD_MAX_ACCOUNTS", default_value_t = 32)]
    pub max_accounts: usize,

    /// Delay after the last credential change before it is written to disk
    #[arg(long, env = "LBCLOUD_SAVE_DEBOUNCE_MS", default_value_t = 4000)]
    pub save_debounce_ms: u64,

    /// Number of cached index handles tolerated before the cache is cleared
    #[arg(long, env = "LBCLOUD_CACHE_LIMIT", default_value_t = 256)]
    pub cache_limit: usize,

    /// How long an operation waits for its account lock
    #[arg(long, env = "LBCLOUD_LOCK_TIMEOUT_MS", default_value_t = 30_000)]
    pub lock_timeout_ms: u64,

    /// Digest used to derive account identifiers
    #[arg(long, env = "LBCLOUD_DIGEST", value_enum, default_value_t = DigestAlgorithm::Md5)]
    pub digest: DigestAlgorithm,
}
