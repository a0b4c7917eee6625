use std::fmt;
use std::sync::Arc;

use treesync_core::formats::IndexError;
use treesync_core::SyncPlan;
use treesync_infra::hook::PostApplyHook;
use treesync_infra::net::TransportError;
use treesync_infra::HookError;
use treesync_scanner::ScannerError;

pub mod engine;
pub mod execute;
pub mod remote;

/// Exit code for configuration and usage problems.
pub const USAGE_EXIT_CODE: i32 = 2;

#[derive(Clone)]
pub struct SyncConfig {
    /// Index file name, relative to the source and to the local root.
    pub index_name: String,
    /// Upper bound on concurrent fetches. Must be at least 1.
    pub workers: usize,
    /// Stage changed files next to their final path and rename them in once
    /// every fetch has finished.
    pub atomic_apply: bool,
    pub hook: Option<Arc<dyn PostApplyHook>>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            index_name: treesync_config::DEFAULT_INDEX_FILE.to_string(),
            workers: treesync_config::DEFAULT_WORKERS,
            atomic_apply: false,
            hook: None,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("index_name", &self.index_name)
            .field("workers", &self.workers)
            .field("atomic_apply", &self.atomic_apply)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    FetchingIndex,
    Snapshotting,
    Diffed,
    Fetching,
    Staging,
    Promoting,
    Removing,
    HookRunning,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    Add,
    Change,
    Remove,
}

impl ItemAction {
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Change => '~',
            Self::Remove => '-',
        }
    }
}

/// Progress notifications emitted while a sync runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Phase(SyncPhase),
    Item {
        action: ItemAction,
        path: String,
        ok: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub plan: SyncPlan,
    pub fetched: u64,
    pub fetch_failed: u64,
    pub staged: u64,
    pub stage_failed: u64,
    pub promoted: u64,
    pub promote_failed: u64,
    pub removed: u64,
    pub remove_failed: u64,
    pub bytes_fetched: u64,
    pub hook_ran: bool,
}

impl SyncReport {
    /// Per-item failures. These never abort a sync.
    pub fn failures(&self) -> u64 {
        self.fetch_failed + self.stage_failed + self.promote_failed + self.remove_failed
    }
}

/// High-level error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Remote index fetch error: {0}")]
    Remote(#[source] TransportError),
    #[error("Remote index decode error: {0}")]
    Decode(#[source] IndexError),
    #[error("Local snapshot error: {0}")]
    Scan(#[from] ScannerError),
    #[error("Local state error: {0}")]
    Local(String),
    #[error("Post-apply hook error: {0}")]
    Hook(#[from] HookError),
}

impl SyncError {
    /// Process exit code a CLI should report for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Scan(ScannerError::InvalidRoot(_)) => USAGE_EXIT_CODE,
            Self::Hook(e) => e.exit_code(),
            _ => 1,
        }
    }
}

pub use engine::SyncEngine;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(SyncError::Config("workers".into()).exit_code(), 2);
        assert_eq!(SyncError::Local("boom".into()).exit_code(), 1);
        assert_eq!(
            SyncError::Hook(HookError::Failed { code: 42 }).exit_code(),
            42
        );
        assert_eq!(
            SyncError::Hook(HookError::Parse("'".into())).exit_code(),
            255
        );
        assert_eq!(
            SyncError::Remote(TransportError::Status {
                path: "treesync.json".into(),
                status: 404
            })
            .exit_code(),
            1
        );
    }

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.index_name, "treesync.json");
        assert_eq!(config.workers, 10);
        assert!(!config.atomic_apply);
        assert!(config.hook.is_none());
    }

    #[test]
    fn failures_sum_every_phase() {
        let report = SyncReport {
            fetch_failed: 1,
            stage_failed: 2,
            promote_failed: 3,
            remove_failed: 4,
            ..Default::default()
        };
        assert_eq!(report.failures(), 10);
    }
}
