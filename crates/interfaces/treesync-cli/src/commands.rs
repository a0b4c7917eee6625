use crate::RemoteOptions;
use anyhow::Context;
use camino::Utf8PathBuf;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use treesync_core::formats::encode_index;
use treesync_core::path_utils::TreePath;
use treesync_core::{DigestAlgorithm, Snapshot, SyncPlan};
use treesync_infra::{CommandHook, HttpTransport, PostApplyHook};
use treesync_pipeline::{
    ScanStats, Snapshotter, SyncConfig, SyncEngine, SyncError, SyncEvent, SyncPhase, SyncReport,
};

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn phase_label(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::FetchingIndex => "Fetching index...",
        SyncPhase::Snapshotting => "Hashing local files...",
        SyncPhase::Diffed => "Planning...",
        SyncPhase::Fetching => "Downloading...",
        SyncPhase::Staging => "Staging changed files...",
        SyncPhase::Promoting => "Replacing changed files...",
        SyncPhase::Removing => "Removing extraneous files...",
        SyncPhase::HookRunning => "Running hook...",
        SyncPhase::Done => "Done",
    }
}

fn build_engine(remote: &RemoteOptions, algorithm: DigestAlgorithm) -> anyhow::Result<SyncEngine> {
    let transport = HttpTransport::new(&remote.source, &remote.transport_config())?;
    Ok(SyncEngine::new(
        Arc::new(transport),
        Snapshotter::new(algorithm),
    ))
}

fn print_plan(plan: &SyncPlan) {
    for p in &plan.added {
        println!("[+] {}", p);
    }
    for p in &plan.changed {
        println!("[~] {}", p);
    }
    for p in &plan.removed {
        println!("[-] {}", p);
    }
}

/// Snapshot `path` and write its index to `path/<index_name>`.
pub async fn cmd_index(
    path: Utf8PathBuf,
    index_name: String,
    print: bool,
    algorithm: DigestAlgorithm,
) -> anyhow::Result<Snapshot> {
    println!(":: Indexing directory: {}", path);
    TreePath::validate(&index_name)
        .map_err(|e| SyncError::Config(format!("invalid index name {index_name:?}: {e}")))?;

    let pb = spinner();
    let cb_pb = pb.clone();
    let root = path.clone();
    let (snapshot, stats) = tokio::task::spawn_blocking(move || {
        let cb = move |stats: &ScanStats| {
            cb_pb.set_message(format!(
                "Hashed {} files ({})",
                stats.files_digested,
                format_size(stats.bytes_digested, DECIMAL)
            ));
        };
        Snapshotter::new(algorithm).scan(&root, Some(&cb))
    })
    .await??;
    pb.finish_and_clear();

    let snapshot = snapshot.pruned(&index_name);
    let encoded = encode_index(&snapshot)?;
    let out = path.join(&index_name);
    std::fs::write(&out, encoded).with_context(|| format!("Failed to write {}", out))?;

    println!(
        ":: Indexed {} files ({}, {})",
        snapshot.len(),
        format_size(stats.bytes_digested, DECIMAL),
        algorithm
    );
    if stats.files_skipped > 0 {
        println!("   Skipped: {} unreadable files", stats.files_skipped);
    }
    println!(":: Saved index to {}", out);

    if print {
        for (p, digest) in snapshot.iter() {
            println!("{}: {}", digest.to_hex(), p);
        }
    }

    Ok(snapshot)
}

/// Dry run: report what a sync would change.
pub async fn cmd_check(
    remote: RemoteOptions,
    local_path: Utf8PathBuf,
    algorithm: DigestAlgorithm,
) -> anyhow::Result<SyncPlan> {
    println!(":: Analyzing state...");
    println!("   Source: {}", remote.source);
    println!("   Local:  {}", local_path);

    let engine = build_engine(&remote, algorithm)?;
    let plan = engine.plan(&local_path, &remote.index_name).await?;

    print_plan(&plan);
    println!("\n:: Analysis Result");
    println!("   Pending Downloads: {}", plan.added.len());
    println!("   Pending Updates:   {}", plan.changed.len());
    println!("   Pending Deletes:   {}", plan.removed.len());
    if plan.is_empty() {
        println!("   Status:            Up to date");
    } else {
        println!("   Status:            Updates available (run `sync`)");
    }

    Ok(plan)
}

pub async fn cmd_sync(
    remote: RemoteOptions,
    path: Utf8PathBuf,
    algorithm: DigestAlgorithm,
    threads: usize,
    atomic: bool,
    exec: Option<String>,
) -> anyhow::Result<SyncReport> {
    println!(":: Synchronizing against {}", remote.source);
    println!("   Target: {}", path);

    // Reject a malformed hook before touching anything.
    let hook: Option<Arc<dyn PostApplyHook>> = match exec.as_deref() {
        Some(command) => Some(Arc::new(CommandHook::new(command)?)),
        None => None,
    };

    let engine = build_engine(&remote, algorithm)?;
    let config = SyncConfig {
        index_name: remote.index_name.clone(),
        workers: threads,
        atomic_apply: atomic,
        hook,
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel(100);
    let root = path.clone();
    let engine_handle =
        tokio::spawn(async move { engine.sync(&root, &config, Some(tx)).await });

    let pb = spinner();
    while let Some(ev) = rx.recv().await {
        match ev {
            SyncEvent::Phase(phase) => pb.set_message(phase_label(phase)),
            SyncEvent::Item { action, path, ok } => pb.suspend(|| {
                if ok {
                    println!("[{}] {}", action.symbol(), path);
                } else {
                    println!("[{}] {} (failed)", action.symbol(), path);
                }
            }),
        }
    }

    let result = engine_handle.await?;
    pb.finish_and_clear();
    let report = result?;

    println!("\n:: Sync Result");
    println!("   Added:       {}", report.plan.added.len());
    println!("   Changed:     {}", report.plan.changed.len());
    println!("   Removed:     {}", report.plan.removed.len());
    println!(
        "   Transferred: {}",
        format_size(report.bytes_fetched, DECIMAL)
    );
    if report.failures() > 0 {
        println!("   Failed:      {} (see log)", report.failures());
    }
    if report.hook_ran {
        println!("   Hook:        completed");
    }

    Ok(report)
}
