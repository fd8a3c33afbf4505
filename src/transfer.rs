use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::util::cancel_requested;

/// One download: remote source, local staging file, per-request policy.
/// Immutable once built. `timeout` bounds the wait for the response and
/// for each chunk, not the whole transfer; game archives run to gigabytes.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub url: String,
    pub dest: PathBuf,
    pub user_agent: String,
    pub timeout: Duration,
    pub expected_sha256: Option<String>,
}

impl TransferRequest {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>, user_agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            user_agent: user_agent.into(),
            timeout: Duration::from_secs(30),
            expected_sha256: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Cumulative byte count plus the advertised total, when the server sent
/// one. `total == None` means the size is unknown and the UI should render
/// an unbounded counter instead of a percentage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes: u64,
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Whole-number percentage, floored. `None` when the total is unknown,
    /// which is distinct from "0% of a known size".
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(total) if total > 0 => Some((self.bytes.saturating_mul(100) / total).min(100) as u8),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    /// Not a failure from the user's point of view; callers suppress it.
    #[error("download cancelled")]
    Cancelled,
    #[error("connection timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("download failed: {0}")]
    Transport(String),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("unexpected download error: {0}")]
    Unexpected(String),
}

impl TransferError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

fn classify(err: reqwest::Error) -> TransferError {
    if err.is_timeout() {
        TransferError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransferError::Connect(err.to_string())
    } else {
        TransferError::Transport(err.to_string())
    }
}

#[derive(Clone)]
pub struct TransferEngine {
    client: Client,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferEngine {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Stream `request.url` into `request.dest`, emitting one progress
    /// event per chunk and checking the cancellation flag at every chunk
    /// boundary. Chunk granularity is whatever the connection delivers,
    /// so the number of progress events varies between runs. On any exit
    /// other than clean success the staging file is removed; removal
    /// failures are logged, never surfaced.
    pub async fn download<F>(
        &self,
        request: &TransferRequest,
        cancel: Option<Arc<AtomicBool>>,
        progress: F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(TransferProgress),
    {
        let result = self.stream_to_file(request, &cancel, progress).await;
        if result.is_err() && async_fs::remove_file(&request.dest).await.is_err() {
            debug!(
                "transfer: no staging file to clean at {}",
                request.dest.display()
            );
        }
        result
    }

    async fn stream_to_file<F>(
        &self,
        request: &TransferRequest,
        cancel: &Option<Arc<AtomicBool>>,
        mut progress: F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(TransferProgress),
    {
        if cancel_requested(cancel) {
            warn!("transfer: cancelled before request");
            return Err(TransferError::Cancelled);
        }

        let response = timeout(
            request.timeout,
            self.client
                .get(&request.url)
                .header(reqwest::header::USER_AGENT, &request.user_agent)
                .send(),
        )
        .await
        .map_err(|_| {
            TransferError::Timeout(format!("no response within {:?}", request.timeout))
        })?
        .map_err(classify)?
        .error_for_status()
        .map_err(classify)?;

        if let Some(parent) = request.dest.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::Unexpected(format!("failed to create download dir: {e}")))?;
        }
        let mut file = async_fs::File::create(&request.dest)
            .await
            .map_err(|e| TransferError::Unexpected(format!("failed to create staging file: {e}")))?;

        let total = response.content_length();
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            let chunk = match timeout(request.timeout, stream.next()).await {
                Ok(Some(chunk)) => chunk.map_err(classify)?,
                Ok(None) => break,
                Err(_) => {
                    return Err(TransferError::Timeout(format!(
                        "no data within {:?}",
                        request.timeout
                    )));
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::Unexpected(format!("write error: {e}")))?;
            downloaded += chunk.len() as u64;
            progress(TransferProgress {
                bytes: downloaded,
                total,
            });
            if cancel_requested(cancel) {
                warn!("transfer: cancelled after {downloaded} bytes");
                return Err(TransferError::Cancelled);
            }
        }

        file.flush()
            .await
            .map_err(|e| TransferError::Unexpected(format!("flush error: {e}")))?;

        if let Some(total) = total
            && downloaded < total
        {
            return Err(TransferError::Transport(format!(
                "download incomplete: received {downloaded} of {total} bytes"
            )));
        }

        if let Some(expected) = request.expected_sha256.as_deref() {
            verify_sha256(&request.dest, expected)?;
        }

        debug!(
            "transfer: {} complete ({downloaded} bytes)",
            request.dest.display()
        );
        Ok(())
    }
}

fn verify_sha256(path: &Path, expected: &str) -> Result<(), TransferError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| TransferError::Unexpected(format!("checksum open error: {e}")))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| TransferError::Unexpected(format!("checksum read error: {e}")))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    let actual = format!("{:x}", hasher.finalize());
    if actual != expected.to_lowercase() {
        return Err(TransferError::ChecksumMismatch {
            expected: expected.to_owned(),
            actual,
        });
    }
    Ok(())
}

/// TCP reachability probe used as the connectivity precondition before a
/// download is attempted, and by diagnostics.
pub async fn probe_host(host: &str, port: u16, limit: Duration) -> bool {
    let target = format!("{host}:{port}");
    matches!(timeout(limit, TcpStream::connect(target)).await, Ok(Ok(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::Ordering;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn serve_once(body: Vec<u8>, advertise_length: bool) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = [0u8; 1024];
            let _ = socket.read(&mut head).await;
            let header = if advertise_length {
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
            } else {
                "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_owned()
            };
            socket.write_all(header.as_bytes()).await.unwrap();
            for chunk in body.chunks(8192) {
                socket.write_all(chunk).await.unwrap();
                socket.flush().await.unwrap();
            }
            socket.shutdown().await.ok();
        });
        addr
    }

    fn request_for(addr: SocketAddr, dest: &Path) -> TransferRequest {
        TransferRequest::new(format!("http://{addr}/archive.zip"), dest, "YanixLauncher/test")
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn percent_floors_and_flags_unknown_totals() {
        let known = TransferProgress {
            bytes: 999,
            total: Some(1000),
        };
        assert_eq!(known.percent(), Some(99));
        let full = TransferProgress {
            bytes: 1000,
            total: Some(1000),
        };
        assert_eq!(full.percent(), Some(100));
        let start = TransferProgress {
            bytes: 0,
            total: Some(1000),
        };
        assert_eq!(start.percent(), Some(0));
        let unknown = TransferProgress {
            bytes: 4096,
            total: None,
        };
        assert_eq!(unknown.percent(), None);
    }

    #[tokio::test]
    async fn downloads_body_and_reports_monotonic_progress() {
        let body: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let addr = serve_once(body.clone(), true).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");

        let mut events: Vec<TransferProgress> = Vec::new();
        TransferEngine::new()
            .download(&request_for(addr, &dest), None, |p| events.push(p))
            .await
            .unwrap();

        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(pair[0].bytes <= pair[1].bytes);
        }
        let last = events.last().unwrap();
        assert_eq!(last.bytes, body.len() as u64);
        assert_eq!(last.total, Some(body.len() as u64));
        assert_eq!(last.percent(), Some(100));
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn unknown_length_reports_bytes_without_percent() {
        let body = vec![7u8; 20_000];
        let addr = serve_once(body.clone(), false).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");

        let mut events: Vec<TransferProgress> = Vec::new();
        TransferEngine::new()
            .download(&request_for(addr, &dest), None, |p| events.push(p))
            .await
            .unwrap();

        assert!(events.iter().all(|p| p.total.is_none()));
        assert!(events.iter().all(|p| p.percent().is_none()));
        assert_eq!(events.last().unwrap().bytes, body.len() as u64);
    }

    #[tokio::test]
    async fn cancel_at_chunk_boundary_removes_staging_file() {
        let body = vec![1u8; 200_000];
        let addr = serve_once(body, true).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");

        let flag = Arc::new(AtomicBool::new(false));
        let observer = flag.clone();
        let err = TransferEngine::new()
            .download(&request_for(addr, &dest), Some(flag), move |_| {
                // Raise the flag after the first chunk arrives; the engine
                // must observe it at the next boundary.
                observer.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn cancel_before_start_performs_no_request() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let flag = Arc::new(AtomicBool::new(true));
        let request = TransferRequest::new(
            "http://127.0.0.1:9/unroutable.zip",
            &dest,
            "YanixLauncher/test",
        );

        let err = TransferEngine::new()
            .download(&request, Some(flag), |_| {})
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect_error() {
        // Bind then drop to get a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let err = TransferEngine::new()
            .download(&request_for(addr, &dest), None, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::Connect(_) | TransferError::Transport(_)
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn checksum_mismatch_fails_and_cleans_up() {
        let body = b"not the advertised contents".to_vec();
        let addr = serve_once(body, true).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let mut request = request_for(addr, &dest);
        request.expected_sha256 =
            Some("deadbeef00000000000000000000000000000000000000000000000000000000".into());

        let err = TransferEngine::new()
            .download(&request, None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn matching_checksum_passes() {
        let body = b"stable bytes".to_vec();
        let digest = {
            let mut hasher = Sha256::new();
            hasher.update(&body);
            format!("{:x}", hasher.finalize())
        };
        let addr = serve_once(body.clone(), true).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let mut request = request_for(addr, &dest);
        request.expected_sha256 = Some(digest);

        TransferEngine::new()
            .download(&request, None, |_| {})
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn probe_host_detects_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(probe_host("127.0.0.1", addr.port(), Duration::from_secs(1)).await);

        drop(listener);
        assert!(!probe_host("127.0.0.1", addr.port(), Duration::from_secs(1)).await);
    }
}
