//! CLI-to-runtime configuration assembly: validate once, fail fast, then hand a fully-checked
//! [`CoreConfig`] to the rest of the agent.

use eyre::{eyre, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Where the Applied-Versions Store's packed binary encoding is persisted between runs.
    pub applied_versions_file: PathBuf,

    /// Optional JSON fixture describing the cached multipart bundle the retry engine rebuilds
    /// requests from. Absent means an empty cache (every retry fails until one is supplied).
    pub multipart_cache_file: Option<PathBuf>,

    /// Stamped onto every upstream notification this run emits.
    pub global_transaction_id: String,

    /// Process events already queued (e.g. piped via stdin) and exit, rather than running the
    /// timer loop and waiting indefinitely for more.
    pub once: bool,

    /// Single-instance guard file, held alongside the applied-versions file.
    pub lock_file: PathBuf,
}

impl CoreConfig {
    pub fn from_cli(
        applied_versions_file: PathBuf,
        multipart_cache_file: Option<PathBuf>,
        global_transaction_id: String,
        once: bool,
    ) -> Result<Self> {
        if global_transaction_id.trim().is_empty() {
            return Err(eyre!("global transaction id must not be empty"));
        }

        if let Some(cache_file) = &multipart_cache_file {
            if !cache_file.exists() {
                return Err(eyre!(
                    "multipart cache fixture {} does not exist",
                    cache_file.display()
                ));
            }
        }

        let lock_file = applied_versions_file.with_extension("lock");

        Ok(Self {
            applied_versions_file,
            multipart_cache_file,
            global_transaction_id,
            once,
            lock_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_global_transaction_id() {
        let result = CoreConfig::from_cli(PathBuf::from("avs.bin"), None, "  ".to_string(), false);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_multipart_cache_fixture() {
        let result = CoreConfig::from_cli(
            PathBuf::from("avs.bin"),
            Some(PathBuf::from("/tmp/does-not-exist-webcfg-cache.json")),
            "gtx-1".to_string(),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn lock_file_sits_alongside_applied_versions_file() {
        let cfg =
            CoreConfig::from_cli(PathBuf::from("/var/lib/webcfg/avs.bin"), None, "gtx-1".into(), true)
                .unwrap();
        assert_eq!(cfg.lock_file, PathBuf::from("/var/lib/webcfg/avs.lock"));
    }
}
