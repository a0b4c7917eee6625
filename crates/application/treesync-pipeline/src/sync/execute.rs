use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, StreamExt};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};
use treesync_config::STAGING_PREFIX;
use treesync_infra::net::{ByteStream, Transport, TransportError};

use crate::sync::{ItemAction, SyncEvent};

#[derive(Debug, thiserror::Error)]
pub(crate) enum ItemError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A fully written temp file waiting to be renamed onto its final path.
///
/// Dropping it without promoting deletes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    rel_path: String,
    final_path: Utf8PathBuf,
    temp: TempPath,
    bytes: u64,
}

impl StagedFile {
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    pub fn final_path(&self) -> &Utf8Path {
        &self.final_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Rename the temp file onto the final path. On failure the temp file is
    /// removed.
    pub fn promote(self) -> io::Result<()> {
        let StagedFile {
            temp, final_path, ..
        } = self;
        temp.persist(final_path.as_std_path()).map_err(|e| e.error)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BatchOutcome {
    pub ok: u64,
    pub failed: u64,
    pub bytes: u64,
}

pub(crate) async fn emit(events: Option<&Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching.
        let _ = tx.send(event).await;
    }
}

/// Applies the filesystem side of a plan below `root`.
pub(crate) struct Applier<'a> {
    transport: &'a dyn Transport,
    root: &'a Utf8Path,
    workers: usize,
    events: Option<&'a Sender<SyncEvent>>,
}

impl<'a> Applier<'a> {
    pub(crate) fn new(
        transport: &'a dyn Transport,
        root: &'a Utf8Path,
        workers: usize,
        events: Option<&'a Sender<SyncEvent>>,
    ) -> Self {
        Self {
            transport,
            root,
            workers: workers.max(1),
            events,
        }
    }

    async fn item(&self, action: ItemAction, path: &str, ok: bool) {
        emit(
            self.events,
            SyncEvent::Item {
                action,
                path: path.to_string(),
                ok,
            },
        )
        .await;
    }

    /// Fetch every item straight onto its final path, at most `workers` at a time.
    pub(crate) async fn fetch_all(&self, items: Vec<(ItemAction, String)>) -> BatchOutcome {
        let this = self;
        let results: Vec<Result<u64, ()>> = stream::iter(items)
            .map(move |(action, rel)| async move {
                let res = this.fetch_direct(&rel).await;
                match &res {
                    Ok(bytes) => debug!("Fetched {} ({} bytes)", rel, bytes),
                    Err(e) => warn!("Failed to fetch {}: {}", rel, e),
                }
                this.item(action, &rel, res.is_ok()).await;
                res.map_err(|_| ())
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for res in results {
            match res {
                Ok(bytes) => {
                    outcome.ok += 1;
                    outcome.bytes += bytes;
                }
                Err(()) => outcome.failed += 1,
            }
        }
        outcome
    }

    /// Fetch every path into a temp file beside its final path. Failed
    /// paths leave nothing behind and are left out of the result.
    pub(crate) async fn stage_all(&self, paths: &[String]) -> (Vec<StagedFile>, BatchOutcome) {
        let this = self;
        let results: Vec<Option<StagedFile>> = stream::iter(paths)
            .map(move |rel| async move {
                match this.stage(rel).await {
                    Ok(staged) => {
                        debug!("Staged {} at {}", rel, staged.temp_path().display());
                        Some(staged)
                    }
                    Err(e) => {
                        warn!("Failed to stage {}: {}", rel, e);
                        this.item(ItemAction::Change, rel, false).await;
                        None
                    }
                }
            })
            .buffer_unordered(self.workers)
            .boxed()
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        let mut staged = Vec::with_capacity(results.len());
        for res in results {
            match res {
                Some(file) => {
                    outcome.ok += 1;
                    outcome.bytes += file.bytes();
                    staged.push(file);
                }
                None => outcome.failed += 1,
            }
        }
        staged.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        (staged, outcome)
    }

    pub(crate) async fn promote_all(&self, staged: Vec<StagedFile>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for file in staged {
            let rel = file.rel_path.clone();
            match file.promote() {
                Ok(()) => {
                    debug!("Promoted {}", rel);
                    outcome.ok += 1;
                    self.item(ItemAction::Change, &rel, true).await;
                }
                Err(e) => {
                    warn!("Failed to promote {}: {}", rel, e);
                    outcome.failed += 1;
                    self.item(ItemAction::Change, &rel, false).await;
                }
            }
        }
        outcome
    }

    pub(crate) async fn remove_all(&self, paths: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for rel in paths {
            match remove_tree_path(self.root, rel).await {
                Ok(()) => {
                    debug!("Removed {}", rel);
                    outcome.ok += 1;
                    self.item(ItemAction::Remove, rel, true).await;
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", rel, e);
                    outcome.failed += 1;
                    self.item(ItemAction::Remove, rel, false).await;
                }
            }
        }
        outcome
    }

    async fn fetch_direct(&self, rel: &str) -> Result<u64, ItemError> {
        let target = self.root.join(rel);
        let stream = self.transport.fetch(rel).await?;
        prepare_parents(self.root, rel).await?;
        // Snapshots never list symlinks, so one sitting here is replaced
        // rather than written through.
        if is_symlink(&target).await {
            unlink(&target).await?;
        }
        let mut file = tokio::fs::File::create(&target).await?;
        write_stream(stream, &mut file).await
    }

    async fn stage(&self, rel: &str) -> Result<StagedFile, ItemError> {
        let final_path = self.root.join(rel);

        let stream = self.transport.fetch(rel).await?;
        let parent = prepare_parents(self.root, rel).await?;

        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // The mode a plain create asks for; the umask still applies.
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }
        let (file, temp) = builder.tempfile_in(&parent)?.into_parts();
        // Declared after `temp`, so an early return closes the file before
        // the temp path is deleted.
        let mut file = tokio::fs::File::from_std(file);
        let bytes = write_stream(stream, &mut file).await?;
        file.sync_all().await?;
        drop(file);

        // A replaced file keeps its mode, as it does when written in place.
        match tokio::fs::symlink_metadata(&final_path).await {
            Ok(meta) if meta.is_file() => {
                tokio::fs::set_permissions(&temp, meta.permissions()).await?;
            }
            _ => {}
        }

        Ok(StagedFile {
            rel_path: rel.to_string(),
            final_path,
            temp,
            bytes,
        })
    }
}

async fn write_stream(
    mut stream: ByteStream,
    file: &mut tokio::fs::File,
) -> Result<u64, ItemError> {
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Make every directory between `root` and the parent of `rel` a real
/// directory and return that parent. Symlinks on the way are replaced with
/// directories; a regular file in the way is an error.
async fn prepare_parents(root: &Utf8Path, rel: &str) -> io::Result<Utf8PathBuf> {
    let mut dir = root.to_path_buf();
    let mut segments: Vec<&str> = rel.split('/').collect();
    segments.pop();
    for seg in segments {
        dir.push(seg);
        ensure_real_dir(&dir).await?;
    }
    Ok(dir)
}

async fn ensure_real_dir(dir: &Utf8Path) -> io::Result<()> {
    match tokio::fs::symlink_metadata(dir).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(meta) if meta.file_type().is_symlink() => unlink(dir).await?,
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{dir} exists and is not a directory"),
            ));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    match tokio::fs::create_dir(dir).await {
        // A sibling item got there first.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if tokio::fs::symlink_metadata(dir).await?.is_dir() {
                Ok(())
            } else {
                Err(e)
            }
        }
        other => other,
    }
}

async fn is_symlink(path: &Utf8Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .is_ok_and(|m| m.file_type().is_symlink())
}

/// Remove a symlink itself, never its target. A link that is already gone
/// counts as removed.
async fn unlink(path: &Utf8Path) -> io::Result<()> {
    let res = match tokio::fs::remove_file(path).await {
        // Directory symlinks on Windows need remove_dir.
        Err(e) if cfg!(windows) && e.kind() != io::ErrorKind::NotFound => {
            tokio::fs::remove_dir(path).await
        }
        other => other,
    };
    match res {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Delete `root/rel`, recursively if it is a directory. A path that is
/// already gone counts as removed.
pub(crate) async fn remove_tree_path(root: &Utf8Path, rel: &str) -> io::Result<()> {
    let target = root.join(rel);
    let meta = match tokio::fs::symlink_metadata(&target).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let res = if meta.is_dir() {
        tokio::fs::remove_dir_all(&target).await
    } else {
        tokio::fs::remove_file(&target).await
    };
    match res {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
