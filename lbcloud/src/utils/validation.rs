use std::sync::LazyLock;

use regex::Regex;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^./\\\x00][^/\\\x00]{0,254}$").expect("segment regex is valid"));

/// A namespace or file name must stay a single path segment below the account directory,
/// which also keeps it away from the hidden index file.
pub fn is_valid_segment(name: &str) -> bool {
    name.len() <= 255 && SEGMENT.is_match(name)
}
