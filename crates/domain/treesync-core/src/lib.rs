use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod diff;
pub mod formats;
pub mod path_utils;

use path_utils::{PathError, TreePath};

/// Identifies how a [`FileDigest`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// Cryptographic general-purpose hash. Used unless something else is asked for.
    #[default]
    #[serde(rename = "md5")]
    Md5,
    /// XXH64 (seed 0). Very fast and good at spotting changes, but not
    /// resistant to deliberate tampering.
    #[serde(rename = "xxh64")]
    XxHash64,
}

impl DigestAlgorithm {
    /// Lenient parse used for environment/flag selection.
    /// Unknown or missing names fall back to [`DigestAlgorithm::Md5`].
    pub fn from_name_lossy(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            Some("xx") | Some("xxh64") | Some("xxhash") | Some("xxhash64") => Self::XxHash64,
            _ => Self::Md5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::XxHash64 => "xxh64",
        }
    }

    /// Length in bytes of a digest produced by this algorithm.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::XxHash64 => 8,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fingerprint of a file's bytes under a named algorithm.
///
/// Equality requires both the algorithm and the raw bytes to match, so two
/// digests produced by different algorithms are never considered equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileDigest {
    algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

impl FileDigest {
    pub fn new(algorithm: DigestAlgorithm, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            bytes: bytes.into(),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid path {path:?}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },
    #[error("duplicate path {0:?}")]
    Duplicate(String),
}

/// Immutable map of relative path -> digest describing a file tree.
///
/// Only regular files appear. Every key satisfies [`TreePath::validate`].
/// Keys are ordered, so equal snapshots iterate and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, FileDigest>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot, validating every path and rejecting duplicates.
    pub fn from_entries<I>(entries: I) -> Result<Self, SnapshotError>
    where
        I: IntoIterator<Item = (String, FileDigest)>,
    {
        let mut files = BTreeMap::new();
        for (path, digest) in entries {
            if let Err(source) = TreePath::validate(&path) {
                return Err(SnapshotError::InvalidPath { path, source });
            }
            if files.contains_key(&path) {
                return Err(SnapshotError::Duplicate(path));
            }
            files.insert(path, digest);
        }
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileDigest> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Entries in lexicographic path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileDigest)> {
        self.files.iter().map(|(p, d)| (p.as_str(), d))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Returns the snapshot without `path`. Used to keep an index file out of
    /// the snapshot it describes.
    pub fn pruned(mut self, path: &str) -> Self {
        self.files.remove(path);
        self
    }

    /// The algorithm shared by every entry, if the snapshot is non-empty and uniform.
    pub fn algorithm(&self) -> Option<DigestAlgorithm> {
        let mut algos = self.files.values().map(FileDigest::algorithm);
        let first = algos.next()?;
        algos.all(|a| a == first).then_some(first)
    }
}

/// Work needed to turn a local tree into a remote one.
///
/// The three lists are pairwise disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Present remotely, absent locally.
    pub added: Vec<String>,
    /// Present locally, absent remotely.
    pub removed: Vec<String>,
    /// Present in both with differing digests.
    pub changed: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }

    /// Sort each list lexicographically so execution and logging are reproducible.
    pub fn into_sorted(mut self) -> Self {
        self.added.sort();
        self.removed.sort();
        self.changed.sort();
        self
    }
}
