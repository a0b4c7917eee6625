pub mod sync;

// Re-export core engine components
pub use sync::{
    ItemAction, SyncConfig, SyncEngine, SyncError, SyncEvent, SyncPhase, SyncReport,
};
pub use sync::execute::StagedFile;

// Re-export scanner types often needed by consumers
pub use treesync_scanner::{ScanStats, Snapshotter};
