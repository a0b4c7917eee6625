//! Central configuration constants for runtime limits and defaults.

/// Index file name, relative to both the source URL and the local root.
pub const DEFAULT_INDEX_FILE: &str = "treesync.json";

/// Default number of concurrent fetches during a sync.
pub const DEFAULT_WORKERS: usize = 10;

/// Default per-request timeout, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Environment variable selecting the digest algorithm (`md5` or `xx`).
pub const HASH_ENV_VAR: &str = "TREESYNC_HASH";

/// Name prefix of temp files staged next to their final path.
pub const STAGING_PREFIX: &str = ".treesync.";

/// True for file names that look like an abandoned staging file.
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_names() {
        assert!(is_staging_name(".treesync.a1b2c3"));
        assert!(!is_staging_name("treesync.json"));
        assert!(!is_staging_name("notes.treesync.txt"));
    }
}
