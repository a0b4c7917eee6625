#![allow(dead_code)]

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use treesync_core::formats::encode_index;
use treesync_infra::net::{ByteStream, Transport, TransportError};
use treesync_pipeline::Snapshotter;

pub const INDEX: &str = "treesync.json";

pub fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

pub fn write(root: &Utf8Path, rel: &str, data: &[u8]) {
    let p = root.join(rel);
    std::fs::create_dir_all(p.parent().unwrap()).unwrap();
    std::fs::write(p, data).unwrap();
}

/// Every regular file below `root`, keyed by slash-separated relative path.
pub fn read_tree(root: &Utf8Path) -> BTreeMap<String, Vec<u8>> {
    walkdir_files(root)
        .into_iter()
        .map(|rel| {
            let data = std::fs::read(root.join(&rel)).unwrap();
            (rel, data)
        })
        .collect()
}

fn walkdir_files(root: &Utf8Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = Utf8PathBuf::from_path_buf(entry.path()).unwrap();
            let ty = entry.file_type().unwrap();
            if ty.is_dir() {
                stack.push(path);
            } else if ty.is_file() {
                out.push(path.strip_prefix(root).unwrap().as_str().replace('\\', "/"));
            }
        }
    }
    out.sort();
    out
}

/// File names below `root` that look like leftover staging files.
pub fn staging_leftovers(root: &Utf8Path) -> Vec<String> {
    walkdir_files(root)
        .into_iter()
        .filter(|rel| {
            rel.rsplit('/')
                .next()
                .is_some_and(treesync_config::is_staging_name)
        })
        .collect()
}

/// Snapshot `root` and write its index into it, the way a publisher does.
pub fn publish(root: &Utf8Path) {
    let snapshot = Snapshotter::default()
        .snapshot_excluding(root, INDEX)
        .unwrap();
    std::fs::write(root.join(INDEX), encode_index(&snapshot).unwrap()).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Respond 500 before sending anything.
    ServerError,
    /// Send the first chunk, then abort the body.
    Truncate,
}

#[derive(Clone)]
struct ServerState {
    root: Utf8PathBuf,
    faults: Arc<Mutex<HashMap<String, Fault>>>,
}

async fn serve_file(State(state): State<ServerState>, Path(path): Path<String>) -> Response {
    let fault = state.faults.lock().unwrap().get(&path).copied();
    match fault {
        Some(Fault::ServerError) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "injected").into_response();
        }
        Some(Fault::Truncate) => {
            let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                Ok(Bytes::from_static(b"partial")),
                Err(std::io::Error::new(std::io::ErrorKind::Other, "injected")),
            ];
            let body = stream::iter(chunks).then(|c| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                c
            });
            return Response::new(Body::from_stream(body));
        }
        None => {}
    }

    match tokio::fs::read(state.root.join(&path)).await {
        Ok(data) => (StatusCode::OK, data).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "missing").into_response(),
    }
}

/// HTTP server publishing a directory, with per-path fault injection.
pub struct TestServer {
    pub addr: SocketAddr,
    faults: Arc<Mutex<HashMap<String, Fault>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(root: &Utf8Path) -> Self {
        let faults = Arc::new(Mutex::new(HashMap::new()));
        let state = ServerState {
            root: root.to_path_buf(),
            faults: faults.clone(),
        };
        let app = Router::new()
            .route("/*path", get(serve_file))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            faults,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn inject(&self, path: &str, fault: Fault) {
        self.faults.lock().unwrap().insert(path.to_string(), fault);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// In-memory transport that records how many fetches overlap.
#[derive(Default)]
pub struct MemoryTransport {
    files: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.insert(path.to_string(), data.to_vec());
        self
    }

    pub fn with_failure(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn fetch(&self, rel_path: &str) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(rel_path.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(rel_path) {
            return Err(TransportError::Status {
                path: rel_path.to_string(),
                status: 503,
            });
        }
        match self.files.get(rel_path) {
            Some(data) => {
                let chunk: Result<Bytes, TransportError> = Ok(Bytes::from(data.clone()));
                Ok(stream::iter(vec![chunk]).boxed())
            }
            None => Err(TransportError::Status {
                path: rel_path.to_string(),
                status: 404,
            }),
        }
    }
}
