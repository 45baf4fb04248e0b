//! Copying a dump artifact to its offload destination.
//!
//! Used by the `bmcdump-offload` helper the daemon launches for local
//! offloads. A `unix://` destination makes the helper listen on that socket
//! and stream the file to the first client; anything else is a file path.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

use crate::error::{DaemonError, DaemonResult};

/// How long a `unix://` destination waits for its reader.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where an artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Listen on this socket and stream to one client.
    Socket(PathBuf),
    /// Copy to this file.
    File(PathBuf),
}

impl Destination {
    /// Parses `unix://<socket>`, `file://<path>` or a bare path.
    pub fn parse(uri: &str) -> DaemonResult<Self> {
        let invalid = || DaemonError::Config {
            reason: format!("unsupported offload destination {uri:?}"),
        };
        if let Some(path) = uri.strip_prefix("unix://") {
            return non_empty(path).map(Destination::Socket).ok_or_else(invalid);
        }
        if let Some(path) = uri.strip_prefix("file://") {
            return non_empty(path).map(Destination::File).ok_or_else(invalid);
        }
        if uri.contains("://") {
            return Err(invalid());
        }
        non_empty(uri).map(Destination::File).ok_or_else(invalid)
    }

    /// Filesystem path the destination occupies.
    pub fn path(&self) -> &Path {
        match self {
            Destination::Socket(p) | Destination::File(p) => p,
        }
    }
}

fn non_empty(path: &str) -> Option<PathBuf> {
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Copies `source` to `dest` and returns the bytes written.
///
/// A file destination that resolves to `source` is refused. On failure a
/// destination file created by this call is removed; one that already
/// existed is left in place.
pub async fn offload_file(
    id: u32,
    source: &Path,
    dest: &Destination,
    accept_timeout: Duration,
) -> DaemonResult<u64> {
    let meta = tokio::fs::metadata(source).await?;
    if !meta.is_file() {
        return Err(DaemonError::Config {
            reason: format!("{} is not a regular file", source.display()),
        });
    }
    let result = match dest {
        Destination::File(path) => {
            let existing = tokio::fs::symlink_metadata(path).await.is_ok();
            if same_file(&meta, path).await {
                return Err(DaemonError::Config {
                    reason: format!("{} is the dump itself", path.display()),
                });
            }
            let copied = copy_to_file(source, path).await;
            if copied.is_err() && !existing {
                remove_partial(path).await;
            }
            copied
        }
        Destination::Socket(path) => stream_to_socket(source, path, accept_timeout).await,
    };
    match &result {
        Ok(bytes) => info!(id, bytes, dest = %dest.path().display(), "dump offloaded"),
        Err(e) => warn!(id, dest = %dest.path().display(), error = %e, "offload failed"),
    }
    result
}

async fn same_file(source: &std::fs::Metadata, dest: &Path) -> bool {
    match tokio::fs::metadata(dest).await {
        Ok(meta) => meta.dev() == source.dev() && meta.ino() == source.ino(),
        Err(_) => false,
    }
}

async fn copy_to_file(source: &Path, dest: &Path) -> DaemonResult<u64> {
    let mut reader = File::open(source).await?;
    let mut writer = File::create(dest).await?;
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.sync_all().await?;
    Ok(bytes)
}

async fn stream_to_socket(source: &Path, socket: &Path, accept_timeout: Duration) -> DaemonResult<u64> {
    remove_partial(socket).await;
    let listener = UnixListener::bind(socket)?;
    debug!(socket = %socket.display(), "waiting for offload reader");
    let accepted = tokio::time::timeout(accept_timeout, listener.accept()).await;
    let result = match accepted {
        Ok(Ok((mut stream, _))) => match File::open(source).await {
            Ok(mut reader) => tokio::io::copy(&mut reader, &mut stream)
                .await
                .map_err(DaemonError::from),
            Err(e) => Err(e.into()),
        },
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(DaemonError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no reader connected within {}s", accept_timeout.as_secs()),
        ))),
    };
    drop(listener);
    remove_partial(socket).await;
    result
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove"),
    }
}
