//! Account identifier and auth token derivation.
//!
//! An account id is `<digest hex><time hex>`, an auth token is
//! `<random hex><time hex>`, both sharing the same 16-digit time component.
//! The digest half is a de-duplication key for registrations, not a secret.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of the digest half of an account id.
pub const DIGEST_HEX_LEN: usize = 32;

const DIGEST_BYTES: usize = 16;
const RANDOM_BYTES: usize = 6;
const TIME_HEX_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    /// Lower-case hex of the first 16 digest bytes of `input`.
    pub fn digest_hex(self, input: &[u8]) -> String {
        match self {
            DigestAlgorithm::Md5 => hex::encode(md5::compute(input).0),
            DigestAlgorithm::Sha256 => hex::encode(&Sha256::digest(input)[..DIGEST_BYTES]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: String,
    pub auth_token: String,
}

/// Derives a fresh identity for `source_token` using the current time.
pub fn generate(algorithm: DigestAlgorithm, source_token: &str) -> Identity {
    let mut random = [0u8; RANDOM_BYTES];
    rand::rng().fill_bytes(&mut random);
    generate_at(algorithm, source_token, now_millis(), random)
}

pub fn generate_at(
    algorithm: DigestAlgorithm,
    source_token: &str,
    millis: u64,
    random: [u8; RANDOM_BYTES],
) -> Identity {
    let time = time_component(millis);
    Identity {
        account_id: format!("{}{time}", algorithm.digest_hex(source_token.as_bytes())),
        auth_token: format!("{}{time}", hex::encode(random)),
    }
}

/// Millisecond timestamp as exactly 16 lower-case hex digits.
pub fn time_component(millis: u64) -> String {
    let hex = format!("{millis:0width$x}", width = TIME_HEX_LEN);
    hex[hex.len() - TIME_HEX_LEN..].to_string()
}

/// The digest half of an account id, ignoring the time suffix.
pub fn digest_part(account_id: &str) -> &str {
    account_id.get(..DIGEST_HEX_LEN).unwrap_or(account_id)
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
