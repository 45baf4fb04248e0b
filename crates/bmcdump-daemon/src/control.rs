//! Control socket: JSON-lines requests over a Unix stream socket.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use bmcdump_core::ErrorKind;

use crate::error::{DaemonError, DaemonResult};
use crate::protocol::{ControlRequest, ControlResponse};
use crate::service::ServiceHandle;

/// Bound control socket.
#[derive(Debug)]
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds the socket, replacing a stale one left by a previous run.
    pub fn bind(path: &Path) -> DaemonResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale control socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(path)?;
        info!(path = %path.display(), "control socket listening");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts clients until the listener fails; each client gets its own task.
    pub async fn run(self, handle: ServiceHandle) -> DaemonResult<()> {
        loop {
            let (stream, _) = self.listener.accept().await?;
            let handle = handle.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, handle).await {
                    debug!(error = %e, "control client closed with error");
                }
            });
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove control socket");
            }
        }
    }
}

async fn serve_client(stream: UnixStream, handle: ServiceHandle) -> DaemonResult<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => handle
                .call(request)
                .await
                .unwrap_or_else(ControlResponse::from),
            Err(e) => ControlResponse::Error {
                kind: ErrorKind::InvalidArgument,
                message: format!("malformed request: {e}"),
            },
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        write.write_all(&out).await?;
    }
    Ok(())
}

/// Sends one request to the daemon at `path` and returns its response.
pub async fn send_request(path: &Path, request: &ControlRequest) -> DaemonResult<ControlResponse> {
    let stream = UnixStream::connect(path).await?;
    let (read, mut write) = stream.into_split();
    let mut out = serde_json::to_vec(request)?;
    out.push(b'\n');
    write.write_all(&out).await?;
    let mut lines = BufReader::new(read).lines();
    let line = lines.next_line().await?.ok_or_else(|| {
        DaemonError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "daemon closed the connection without replying",
        ))
    })?;
    Ok(serde_json::from_str(&line)?)
}
