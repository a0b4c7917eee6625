use camino::Utf8Path;
use md5::Context;
use std::fs::File;
use std::io::{self, Read};
use treesync_core::{DigestAlgorithm, FileDigest};
use xxhash_rust::xxh64::Xxh64;

const READ_BUF_SIZE: usize = 64 * 1024;

enum Hasher {
    Md5(Context),
    XxHash64(Xxh64),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(Context::new()),
            DigestAlgorithm::XxHash64 => Self::XxHash64(Xxh64::new(0)),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::XxHash64(h) => h.update(data),
        }
    }

    fn finish(self) -> FileDigest {
        match self {
            Self::Md5(ctx) => FileDigest::new(DigestAlgorithm::Md5, ctx.finalize().0.to_vec()),
            // Canonical XXH64 form is the big-endian encoding of the u64.
            Self::XxHash64(h) => {
                FileDigest::new(DigestAlgorithm::XxHash64, h.digest().to_be_bytes().to_vec())
            }
        }
    }
}

pub fn digest_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> FileDigest {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finish()
}

/// Fold everything `reader` yields through `algorithm`.
pub fn digest_reader<R: Read>(algorithm: DigestAlgorithm, mut reader: R) -> io::Result<FileDigest> {
    let mut hasher = Hasher::new(algorithm);
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Digest of the full content of the file at `fs_path`.
pub fn digest_file(fs_path: &Utf8Path, algorithm: DigestAlgorithm) -> io::Result<FileDigest> {
    let file = File::open(fs_path)?;
    digest_reader(algorithm, file)
}
