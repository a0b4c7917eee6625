pub mod commands;

use camino::Utf8PathBuf;
use std::time::Duration;
use treesync_core::DigestAlgorithm;
use treesync_infra::net::{ClientIdentity, HttpTransportConfig, TransportError};
use treesync_infra::HookError;
use treesync_pipeline::SyncError;
use treesync_scanner::ScannerError;

/// Where to fetch from and how.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub source: String,
    pub index_name: String,
    pub timeout: Duration,
    pub cert: Option<Utf8PathBuf>,
    pub key: Option<Utf8PathBuf>,
}

impl RemoteOptions {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            index_name: treesync_config::DEFAULT_INDEX_FILE.to_string(),
            timeout: Duration::from_secs(treesync_config::DEFAULT_FETCH_TIMEOUT_SECS),
            cert: None,
            key: None,
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        // A client identity needs both halves; clap enforces that for the binary.
        let identity = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some(ClientIdentity {
                cert: cert.clone(),
                key: key.clone(),
            }),
            _ => None,
        };
        HttpTransportConfig {
            timeout: self.timeout,
            identity,
        }
    }
}

/// Lenient `--hash` / `TREESYNC_HASH` parsing; unknown names fall back to MD5.
pub fn digest_algorithm(name: Option<&str>) -> DigestAlgorithm {
    DigestAlgorithm::from_name_lossy(name)
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let code = if let Some(e) = err.downcast_ref::<SyncError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<TransportError>() {
        match e {
            TransportError::InvalidUrl { .. } | TransportError::Credentials(_) => 2,
            _ => 1,
        }
    } else if let Some(e) = err.downcast_ref::<HookError>() {
        match e {
            HookError::Parse(_) => 2,
            other => other.exit_code(),
        }
    } else if let Some(ScannerError::InvalidRoot(_)) = err.downcast_ref::<ScannerError>() {
        2
    } else {
        1
    };
    u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn usage_problems_exit_with_two() {
        let bad_url = anyhow::Error::new(TransportError::InvalidUrl {
            url: "nope".into(),
            reason: "relative URL without a base".into(),
        });
        assert_eq!(exit_code(&bad_url), 2);

        let creds = anyhow::Error::new(TransportError::Credentials("missing".into()))
            .context("building transport");
        assert_eq!(exit_code(&creds), 2);

        let workers = anyhow::Error::new(SyncError::Config("workers".into()));
        assert_eq!(exit_code(&workers), 2);

        let hook = anyhow::Error::new(HookError::Parse("'".into()));
        assert_eq!(exit_code(&hook), 2);
    }

    #[test]
    fn hook_failures_keep_their_exit_code() {
        let err = anyhow::Error::new(SyncError::Hook(HookError::Failed { code: 42 }));
        assert_eq!(exit_code(&err), 42);

        let err = anyhow::Error::new(SyncError::Hook(HookError::Launch(
            std::io::Error::from(std::io::ErrorKind::NotFound),
        )));
        assert_eq!(exit_code(&err), 255);

        // Codes outside 1..=255 cannot be reported as-is.
        let err = anyhow::Error::new(SyncError::Hook(HookError::Failed { code: -1073741510 }));
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn everything_else_exits_with_one() {
        let err = Err::<(), _>(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
            .context("writing index")
            .unwrap_err();
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn hash_names_are_lenient() {
        assert_eq!(digest_algorithm(None), DigestAlgorithm::Md5);
        assert_eq!(digest_algorithm(Some("XX")), DigestAlgorithm::XxHash64);
        assert_eq!(digest_algorithm(Some("sha256")), DigestAlgorithm::Md5);
    }

    #[test]
    fn identity_needs_both_files() {
        let mut opts = RemoteOptions::new("https://example.com");
        opts.cert = Some("client.crt".into());
        assert!(opts.transport_config().identity.is_none());
        opts.key = Some("client.key".into());
        assert!(opts.transport_config().identity.is_some());
    }
}
