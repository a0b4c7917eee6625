use bytes::Bytes;
use camino::Utf8PathBuf;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Identity, Url};
use std::time::Duration;
use tracing::debug;

/// Body of a fetched resource, delivered in chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid source url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("client credentials: {0}")]
    Credentials(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request for {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request for {path} returned status {status}")]
    Status { path: String, status: u16 },
}

/// Where published files come from. Paths are snapshot-relative
/// (`a/b.txt`); the index itself is fetched by its file name.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, rel_path: &str) -> Result<ByteStream, TransportError>;

    /// Fetch and buffer a whole resource.
    async fn fetch_bytes(&self, rel_path: &str) -> Result<Vec<u8>, TransportError> {
        let mut stream = self.fetch(rel_path).await?;
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

/// PEM client certificate and private key for mutual TLS.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub cert: Utf8PathBuf,
    pub key: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Per-request timeout. A request that exceeds it fails; nothing retries.
    pub timeout: Duration,
    pub identity: Option<ClientIdentity>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            identity: None,
        }
    }
}

pub struct HttpTransport {
    client: Client,
    base: Url,
}

/// Parse the source URL that published files hang off.
pub(crate) fn normalize_source_base(source: &str) -> Result<Url, TransportError> {
    let url = Url::parse(source).map_err(|e| TransportError::InvalidUrl {
        url: source.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(TransportError::InvalidUrl {
            url: source.to_string(),
            reason: "url cannot be used as a base".into(),
        });
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TransportError::InvalidUrl {
            url: source.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }

    Ok(url)
}

fn load_identity(identity: &ClientIdentity) -> Result<Identity, TransportError> {
    let mut pem = std::fs::read(&identity.cert).map_err(|e| {
        TransportError::Credentials(format!("reading certificate {}: {e}", identity.cert))
    })?;
    let key = std::fs::read(&identity.key)
        .map_err(|e| TransportError::Credentials(format!("reading key {}: {e}", identity.key)))?;
    pem.push(b'\n');
    pem.extend_from_slice(&key);

    Identity::from_pem(&pem).map_err(|e| {
        TransportError::Credentials(format!(
            "loading {} / {}: {e}",
            identity.cert, identity.key
        ))
    })
}

pub fn build_http_client(config: &HttpTransportConfig) -> Result<Client, TransportError> {
    let mut builder = Client::builder().timeout(config.timeout);
    if let Some(identity) = &config.identity {
        builder = builder.identity(load_identity(identity)?);
    }
    builder.build().map_err(TransportError::Client)
}

impl HttpTransport {
    pub fn new(source: &str, config: &HttpTransportConfig) -> Result<Self, TransportError> {
        let base = normalize_source_base(source)?;
        let client = build_http_client(config)?;
        Ok(Self { client, base })
    }

    pub fn with_client(client: Client, source: &str) -> Result<Self, TransportError> {
        let base = normalize_source_base(source)?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `<base>/<rel_path>`, one URL path segment per path component.
    pub fn file_url(&self, rel_path: &str) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl {
                    url: self.base.to_string(),
                    reason: "cannot mutate url segments".into(),
                })?;
            segs.pop_if_empty();
            for part in rel_path.split('/') {
                if !part.is_empty() {
                    segs.push(part);
                }
            }
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, rel_path: &str) -> Result<ByteStream, TransportError> {
        let url = self.file_url(rel_path)?;
        debug!("GET {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                path: rel_path.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                path: rel_path.to_string(),
                status: status.as_u16(),
            });
        }

        let path = rel_path.to_string();
        Ok(resp
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|source| TransportError::Request {
                    path: path.clone(),
                    source,
                })
            })
            .boxed())
    }
}
