//! File copy, listing and stat across local and remote endpoints.
//!
//! An endpoint is either the local filesystem (the `"local"` sentinel) or a
//! registered connection id. A remote-to-remote copy is relayed through a
//! local staging file that is removed whether or not the copy succeeds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionRegistry};
use crate::error::HubError;
use crate::execution::StateProbe;
use crate::transport::{FileEntry, FileKind};
use crate::Result;

/// Endpoint name that selects the local filesystem.
pub const LOCAL: &str = "local";

/// Source or target of a file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Local,
    Remote(String),
}

impl Endpoint {
    pub fn parse(name: &str) -> Self {
        if name == LOCAL {
            Self::Local
        } else {
            Self::Remote(name.to_string())
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str(LOCAL),
            Self::Remote(id) => f.write_str(id),
        }
    }
}

/// A single-file copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: Endpoint,
    pub source_path: String,
    pub target: Endpoint,
    pub target_path: String,
    /// Create missing parent directories of the target.
    pub create_dirs: bool,
}

impl CopyRequest {
    pub fn new(
        source: Endpoint,
        source_path: impl Into<String>,
        target: Endpoint,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_path: source_path.into(),
            target,
            target_path: target_path.into(),
            create_dirs: true,
        }
    }

    pub fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }
}

/// Copies, lists and stats files through registered connections.
pub struct FileTransfer {
    connections: Arc<ConnectionRegistry>,
}

impl FileTransfer {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    fn resolve(&self, endpoint: &Endpoint) -> Result<Option<Arc<Connection>>> {
        match endpoint {
            Endpoint::Local => Ok(None),
            Endpoint::Remote(id) => self.connections.get(id).map(Some),
        }
    }

    /// Copy one file.
    pub async fn copy(&self, request: &CopyRequest) -> Result<()> {
        if request.source_path.is_empty() || request.target_path.is_empty() {
            return Err(HubError::InvalidParams(
                "source and target paths are required".into(),
            ));
        }

        let source = self.resolve(&request.source)?;
        let target = self.resolve(&request.target)?;
        let (src, dst) = (request.source_path.as_str(), request.target_path.as_str());

        debug!(
            "Copying {}:{} to {}:{}",
            request.source, src, request.target, dst
        );

        match (source, target) {
            (None, None) => {
                require_local_file(Path::new(src)).await?;
                prepare_local_parent(Path::new(dst), request.create_dirs).await?;
                tokio::fs::copy(src, dst)
                    .await
                    .map_err(|e| HubError::OperationFailed(format!("copy {}: {}", src, e)))?;
            }
            (None, Some(to)) => {
                require_local_file(Path::new(src)).await?;
                prepare_remote_parent(&to, dst, request.create_dirs).await?;
                to.handle().put_file(Path::new(src), dst).await?;
            }
            (Some(from), None) => {
                prepare_local_parent(Path::new(dst), request.create_dirs).await?;
                from.handle().get_file(src, Path::new(dst)).await?;
            }
            (Some(from), Some(to)) => {
                relay(&from, src, &to, dst, request.create_dirs).await?;
            }
        }

        info!(
            "Copied {}:{} to {}:{}",
            request.source, src, request.target, dst
        );
        Ok(())
    }

    /// Entries of a directory, sorted by name.
    pub async fn list(&self, endpoint: &Endpoint, path: &str) -> Result<Vec<FileEntry>> {
        match self.resolve(endpoint)? {
            Some(connection) => connection.handle().read_dir(path).await,
            None => list_local(Path::new(path)).await,
        }
    }

    /// Stat one path without following a final symlink.
    pub async fn info(&self, endpoint: &Endpoint, path: &str) -> Result<FileEntry> {
        match self.resolve(endpoint)? {
            Some(connection) => connection.handle().stat(path).await,
            None => {
                let meta = tokio::fs::symlink_metadata(path)
                    .await
                    .map_err(|e| local_err(path, e))?;
                Ok(local_entry(PathBuf::from(path), &meta))
            }
        }
    }
}

/// Remote-to-remote copy through a local staging file.
async fn relay(
    from: &Connection,
    src: &str,
    to: &Connection,
    dst: &str,
    create_dirs: bool,
) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix("ssh-hub-staging-")
        .tempfile()?;
    let staging_path = staging.path().to_path_buf();
    debug!("Staging {} via {}", src, staging_path.display());

    let result = async {
        from.handle().get_file(src, &staging_path).await?;
        prepare_remote_parent(to, dst, create_dirs).await?;
        to.handle().put_file(&staging_path, dst).await
    }
    .await;

    if let Err(e) = staging.close() {
        warn!(
            "Failed to remove staging file {}: {}",
            staging_path.display(),
            e
        );
    }

    result.map_err(|e| match e {
        HubError::OperationFailed(_) | HubError::NotFound { .. } => e,
        other => HubError::OperationFailed(other.to_string()),
    })
}

async fn require_local_file(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(HubError::InvalidParams(format!(
            "not a regular file: {}",
            path.display()
        ))),
        Err(_) => Err(HubError::InvalidParams(format!(
            "source does not exist: {}",
            path.display()
        ))),
    }
}

async fn prepare_local_parent(target: &Path, create: bool) -> Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };
    if create {
        tokio::fs::create_dir_all(parent).await?;
    } else if !tokio::fs::metadata(parent)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(HubError::InvalidParams(format!(
            "target directory does not exist: {}",
            parent.display()
        )));
    }
    Ok(())
}

async fn prepare_remote_parent(connection: &Connection, target: &str, create: bool) -> Result<()> {
    if !create {
        return Ok(());
    }
    let parent = match target.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => return Ok(()),
        Some((parent, _)) => parent,
    };
    let output = connection
        .handle()
        .exec(&StateProbe::mkdir_command(parent)?)
        .await?;
    if !output.success() {
        return Err(HubError::OperationFailed(format!(
            "cannot create {} on {}: {}",
            parent,
            connection.id,
            output.stderr.trim()
        )));
    }
    Ok(())
}

fn local_err(path: &str, e: std::io::Error) -> HubError {
    HubError::OperationFailed(format!("{}: {}", path, e))
}

async fn list_local(path: &Path) -> Result<Vec<FileEntry>> {
    let display = path.display().to_string();
    let mut dir = tokio::fs::read_dir(path)
        .await
        .map_err(|e| local_err(&display, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await.map_err(|e| local_err(&display, e))? {
        let meta = match tokio::fs::symlink_metadata(entry.path()).await {
            Ok(meta) => meta,
            // Vanished between readdir and stat.
            Err(_) => continue,
        };
        entries.push(local_entry(entry.path(), &meta));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn local_entry(path: PathBuf, meta: &std::fs::Metadata) -> FileEntry {
    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };

    let mut entry = FileEntry::new(path.to_string_lossy(), kind).with_size(meta.len());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        entry = entry.with_mode(meta.permissions().mode() & 0o7777);
    }

    if let Some(secs) = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
    {
        entry = entry.with_mtime(secs);
    }
    entry
}
