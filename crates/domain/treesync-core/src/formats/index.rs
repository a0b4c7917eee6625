//! JSON wire format of a published index.
//!
//! ```json
//! {
//!   "version": 1,
//!   "algorithm": "md5",
//!   "files": {
//!     "docs/readme.txt": { "algorithm": "md5", "digest": "5D41402ABC4B2A76B9719D911017C592" },
//!     "legacy.bin": "0123456789ABCDEF0123456789ABCDEF"
//!   }
//! }
//! ```
//!
//! A bare string entry is a hex digest under the index-level `algorithm`.
//! Encoding always writes the tagged object form.

use crate::{DigestAlgorithm, FileDigest, Snapshot, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const INDEX_FORMAT_VERSION: u32 = 1;

fn default_version() -> u32 {
    INDEX_FORMAT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexExternal {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Algorithm applied to bare entries.
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
    pub files: BTreeMap<String, IndexEntryExternal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IndexEntryExternal {
    Bare(String),
    Tagged {
        algorithm: DigestAlgorithm,
        digest: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported index version {0}")]
    Version(u32),
    #[error("digest for {path:?} is not valid hex: {source}")]
    Hex {
        path: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("{algorithm} digest for {path:?} has {len} bytes, expected {expected}")]
    DigestLength {
        path: String,
        algorithm: DigestAlgorithm,
        len: usize,
        expected: usize,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl From<&Snapshot> for IndexExternal {
    fn from(snapshot: &Snapshot) -> Self {
        let files = snapshot
            .iter()
            .map(|(path, digest)| {
                (
                    path.to_string(),
                    IndexEntryExternal::Tagged {
                        algorithm: digest.algorithm(),
                        digest: digest.to_hex(),
                    },
                )
            })
            .collect();

        IndexExternal {
            version: INDEX_FORMAT_VERSION,
            algorithm: snapshot.algorithm().unwrap_or_default(),
            files,
        }
    }
}

impl TryFrom<IndexExternal> for Snapshot {
    type Error = IndexError;

    fn try_from(index: IndexExternal) -> Result<Self, Self::Error> {
        if index.version > INDEX_FORMAT_VERSION {
            return Err(IndexError::Version(index.version));
        }

        let mut entries = Vec::with_capacity(index.files.len());
        for (path, entry) in index.files {
            let (algorithm, hex_digest) = match entry {
                IndexEntryExternal::Bare(d) => (index.algorithm, d),
                IndexEntryExternal::Tagged { algorithm, digest } => (algorithm, digest),
            };
            let bytes = match hex::decode(hex_digest.trim()) {
                Ok(b) => b,
                Err(source) => return Err(IndexError::Hex { path, source }),
            };
            if bytes.len() != algorithm.digest_len() {
                return Err(IndexError::DigestLength {
                    path,
                    algorithm,
                    len: bytes.len(),
                    expected: algorithm.digest_len(),
                });
            }
            entries.push((path, FileDigest::new(algorithm, bytes)));
        }

        Ok(Snapshot::from_entries(entries)?)
    }
}

pub fn encode_index(snapshot: &Snapshot) -> Result<Vec<u8>, IndexError> {
    Ok(serde_json::to_vec_pretty(&IndexExternal::from(snapshot))?)
}

pub fn decode_index(data: &[u8]) -> Result<Snapshot, IndexError> {
    // Indexes written by hand or by other tools sometimes carry a UTF-8 BOM
    // or leading blank lines.
    let mut start = 0usize;
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        start = 3;
    }
    while start < data.len() && data[start].is_ascii_whitespace() {
        start += 1;
    }

    let external: IndexExternal = serde_json::from_slice(&data[start..])?;
    Snapshot::try_from(external)
}
