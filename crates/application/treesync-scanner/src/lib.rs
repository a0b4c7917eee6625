use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};
use treesync_core::path_utils::TreePath;
use treesync_core::{DigestAlgorithm, FileDigest, Snapshot, SnapshotError};
use treesync_infra::hashing;
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("invalid root {0:?}: must be non-empty and must not contain '..'")]
    InvalidRoot(Utf8PathBuf),
    #[error("cannot read root {root}: {source}")]
    Root {
        root: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("root {0} is not a directory")]
    NotADirectory(Utf8PathBuf),
    #[error("snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_digested: u64,
    pub files_skipped: u64,
    pub bytes_digested: u64,
}

pub type ProgressCb<'a> = &'a (dyn Fn(&ScanStats) + Send + Sync);

/// Walks a directory and digests every regular file in it.
///
/// Each discovered file gets its own digest task; all tasks finish before a
/// snapshot is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshotter {
    algorithm: DigestAlgorithm,
}

impl Snapshotter {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn snapshot(&self, root: &Utf8Path) -> Result<Snapshot, ScannerError> {
        self.scan(root, None).map(|(snapshot, _)| snapshot)
    }

    /// Snapshot `root` and drop `excluded` (a snapshot-relative path, usually
    /// the index file living inside the tree).
    pub fn snapshot_excluding(
        &self,
        root: &Utf8Path,
        excluded: &str,
    ) -> Result<Snapshot, ScannerError> {
        Ok(self.snapshot(root)?.pruned(excluded))
    }

    pub fn scan(
        &self,
        root: &Utf8Path,
        on_progress: Option<ProgressCb<'_>>,
    ) -> Result<(Snapshot, ScanStats), ScannerError> {
        if !TreePath::verify_root(root.as_std_path()) {
            return Err(ScannerError::InvalidRoot(root.to_owned()));
        }

        let meta = fs::metadata(root).map_err(|source| ScannerError::Root {
            root: root.to_owned(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ScannerError::NotADirectory(root.to_owned()));
        }
        // Listing the root must work; anything below it is best effort.
        fs::read_dir(root).map_err(|source| ScannerError::Root {
            root: root.to_owned(),
            source,
        })?;

        info!("Snapshotting {} ({})", root, self.algorithm);

        let digests: Mutex<BTreeMap<String, FileDigest>> = Mutex::new(BTreeMap::new());
        let stats = Mutex::new(ScanStats::default());
        let algorithm = self.algorithm;

        rayon::scope(|s| -> Result<(), ScannerError> {
            for entry in WalkDir::new(root).min_depth(1) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) if e.depth() == 0 => {
                        return Err(ScannerError::Root {
                            root: root.to_owned(),
                            source: e.into(),
                        });
                    }
                    Err(e) => {
                        warn!("Skipping unreadable entry under {}: {}", root, e);
                        continue;
                    }
                };

                // Directories are only traversed; symlinks are not followed.
                if !entry.file_type().is_file() {
                    continue;
                }

                let Some((rel_path, fs_path)) = relative_key(root.as_std_path(), entry.path())
                else {
                    warn!(
                        "Skipping {}: not representable as a snapshot path",
                        entry.path().display()
                    );
                    lock(&stats).files_skipped += 1;
                    continue;
                };
                let len = entry.metadata().map(|m| m.len()).unwrap_or(0);

                let digests = &digests;
                let stats = &stats;
                s.spawn(move |_| {
                    match hashing::digest_file(&fs_path, algorithm) {
                        Ok(digest) => {
                            lock(digests).insert(rel_path, digest);
                            let current = {
                                let mut st = lock(stats);
                                st.files_digested += 1;
                                st.bytes_digested += len;
                                st.clone()
                            };
                            if let Some(cb) = on_progress {
                                cb(&current);
                            }
                        }
                        Err(e) => {
                            warn!("Skipping {}: {}", fs_path, e);
                            lock(stats).files_skipped += 1;
                        }
                    }
                });
            }
            Ok(())
        })?;

        let stats = stats.into_inner().unwrap_or_else(PoisonError::into_inner);
        let digests = digests.into_inner().unwrap_or_else(PoisonError::into_inner);
        info!(
            "Snapshot of {}: {} files digested, {} skipped, {} bytes",
            root, stats.files_digested, stats.files_skipped, stats.bytes_digested
        );

        let snapshot = Snapshot::from_entries(digests)?;
        Ok((snapshot, stats))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot key for `path` below `root`, plus the UTF-8 filesystem path.
fn relative_key(root: &Path, path: &Path) -> Option<(String, Utf8PathBuf)> {
    let rel = path.strip_prefix(root).ok()?;
    let mut segs = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => segs.push(s.to_str()?),
            _ => return None,
        }
    }
    let key = segs.join("/");
    if !TreePath::is_safe(&key) {
        return None;
    }
    debug!("Discovered {}", key);
    let fs_path = Utf8PathBuf::from_path_buf(path.to_path_buf()).ok()?;
    Some((key, fs_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_keys_use_forward_slashes() {
        let root = Path::new("/srv/tree");
        let (key, fs_path) = relative_key(root, Path::new("/srv/tree/a/b/c.txt")).unwrap();
        assert_eq!(key, "a/b/c.txt");
        assert_eq!(fs_path, Utf8PathBuf::from("/srv/tree/a/b/c.txt"));
    }

    #[test]
    fn relative_keys_from_dot_root() {
        let (key, _) = relative_key(Path::new("."), Path::new("./x/y")).unwrap();
        assert_eq!(key, "x/y");
    }

    #[test]
    fn paths_outside_root_have_no_key() {
        assert!(relative_key(Path::new("/srv/tree"), Path::new("/etc/passwd")).is_none());
        assert!(relative_key(Path::new("/srv/tree"), Path::new("/srv/tree")).is_none());
    }
}
