use std::io;
use std::sync::Arc;

use camino::Utf8Path;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};
use treesync_core::diff::diff;
use treesync_core::path_utils::TreePath;
use treesync_core::{Snapshot, SyncPlan};
use treesync_infra::net::Transport;
use treesync_scanner::{ScannerError, Snapshotter};

use crate::sync::execute::{emit, Applier, BatchOutcome};
use crate::sync::remote::fetch_remote_snapshot;
use crate::sync::{ItemAction, SyncConfig, SyncError, SyncEvent, SyncPhase, SyncReport};

/// Brings a local directory in line with a published index.
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    snapshotter: Snapshotter,
}

impl SyncEngine {
    pub fn new(transport: Arc<dyn Transport>, snapshotter: Snapshotter) -> Self {
        Self {
            transport,
            snapshotter,
        }
    }

    pub fn snapshotter(&self) -> Snapshotter {
        self.snapshotter
    }

    /// Step 1: Network only. Fetch and decode the index.
    pub async fn fetch_remote_state(&self, index_name: &str) -> Result<Snapshot, SyncError> {
        fetch_remote_snapshot(&*self.transport, index_name).await
    }

    /// Step 2: Disk only. Digest the local tree on a blocking thread.
    ///
    /// A missing root is created when `create_missing` is set and treated as
    /// empty otherwise.
    pub async fn scan_local_state(
        &self,
        root: &Utf8Path,
        index_name: &str,
        create_missing: bool,
    ) -> Result<Snapshot, SyncError> {
        check_root(root)?;

        match tokio::fs::metadata(root).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !create_missing {
                    debug!("{} does not exist yet, treating it as empty", root);
                    return Ok(Snapshot::empty());
                }
                info!("Creating {}", root);
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(|e| SyncError::Local(format!("creating {root} failed: {e}")))?;
            }
            _ => {}
        }

        let snapshotter = self.snapshotter;
        let root = root.to_owned();
        let excluded = index_name.to_owned();
        let snapshot = tokio::task::spawn_blocking(move || {
            snapshotter.snapshot_excluding(&root, &excluded)
        })
        .await
        .map_err(|e| SyncError::Local(format!("snapshot task failed: {e}")))??;
        Ok(snapshot)
    }

    /// Step 3: CPU only. Diff local against remote, every list sorted.
    pub fn compute_plan(&self, local: &Snapshot, remote: &Snapshot) -> SyncPlan {
        diff(local, remote).into_sorted()
    }

    /// Pure planning step - fetch remote, scan local, diff. Nothing on disk changes.
    pub async fn plan(
        &self,
        local_root: &Utf8Path,
        index_name: &str,
    ) -> Result<SyncPlan, SyncError> {
        check_index_name(index_name)?;
        check_root(local_root)?;
        let remote = self.fetch_remote_state(index_name).await?;
        let local = self.scan_local_state(local_root, index_name, false).await?;
        Ok(self.compute_plan(&local, &remote))
    }

    /// Plan + execute.
    ///
    /// Per-file failures are counted in the report and never abort the run.
    /// Failing to obtain either snapshot aborts before anything is written.
    pub async fn sync(
        &self,
        local_root: &Utf8Path,
        config: &SyncConfig,
        events: Option<Sender<SyncEvent>>,
    ) -> Result<SyncReport, SyncError> {
        if config.workers == 0 {
            return Err(SyncError::Config("workers must be at least 1".into()));
        }
        check_index_name(&config.index_name)?;
        check_root(local_root)?;
        let events = events.as_ref();

        emit(events, SyncEvent::Phase(SyncPhase::FetchingIndex)).await;
        let remote = self.fetch_remote_state(&config.index_name).await?;

        emit(events, SyncEvent::Phase(SyncPhase::Snapshotting)).await;
        let local = self
            .scan_local_state(local_root, &config.index_name, true)
            .await?;

        let plan = self.compute_plan(&local, &remote);
        emit(events, SyncEvent::Phase(SyncPhase::Diffed)).await;
        info!(
            "Plan for {}: {} added, {} changed, {} removed",
            local_root,
            plan.added.len(),
            plan.changed.len(),
            plan.removed.len()
        );

        let mut report = SyncReport {
            plan,
            ..Default::default()
        };
        if report.plan.is_empty() {
            info!("{} is up to date", local_root);
            emit(events, SyncEvent::Phase(SyncPhase::Done)).await;
            return Ok(report);
        }

        let applier = Applier::new(&*self.transport, local_root, config.workers, events);
        let plan = &report.plan;

        let mut direct: Vec<(ItemAction, String)> = plan
            .added
            .iter()
            .map(|p| (ItemAction::Add, p.clone()))
            .collect();
        if !config.atomic_apply {
            direct.extend(plan.changed.iter().map(|p| (ItemAction::Change, p.clone())));
        }

        let mut fetch = BatchOutcome::default();
        if !direct.is_empty() {
            emit(events, SyncEvent::Phase(SyncPhase::Fetching)).await;
            fetch = applier.fetch_all(direct).await;
        }

        let mut stage = BatchOutcome::default();
        let mut promote = BatchOutcome::default();
        if config.atomic_apply && !plan.changed.is_empty() {
            emit(events, SyncEvent::Phase(SyncPhase::Staging)).await;
            let (staged, outcome) = applier.stage_all(&plan.changed).await;
            stage = outcome;

            emit(events, SyncEvent::Phase(SyncPhase::Promoting)).await;
            promote = applier.promote_all(staged).await;
        }

        let mut remove = BatchOutcome::default();
        if !plan.removed.is_empty() {
            emit(events, SyncEvent::Phase(SyncPhase::Removing)).await;
            remove = applier.remove_all(&plan.removed).await;
        }

        report.fetched = fetch.ok;
        report.fetch_failed = fetch.failed;
        report.staged = stage.ok;
        report.stage_failed = stage.failed;
        report.promoted = promote.ok;
        report.promote_failed = promote.failed;
        report.removed = remove.ok;
        report.remove_failed = remove.failed;
        report.bytes_fetched = fetch.bytes + stage.bytes;

        if report.failures() > 0 {
            warn!("{} item(s) failed to apply", report.failures());
        }

        if let Some(hook) = &config.hook {
            emit(events, SyncEvent::Phase(SyncPhase::HookRunning)).await;
            hook.run(&report.plan).await?;
            report.hook_ran = true;
        }

        emit(events, SyncEvent::Phase(SyncPhase::Done)).await;
        Ok(report)
    }
}

fn check_root(root: &Utf8Path) -> Result<(), SyncError> {
    if TreePath::verify_root(root.as_std_path()) {
        Ok(())
    } else {
        Err(ScannerError::InvalidRoot(root.to_owned()).into())
    }
}

fn check_index_name(index_name: &str) -> Result<(), SyncError> {
    TreePath::validate(index_name)
        .map_err(|e| SyncError::Config(format!("invalid index name {index_name:?}: {e}")))
}
