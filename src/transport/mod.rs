//! Remote-shell capability.
//!
//! The hub talks to remote hosts only through these traits. The [`ssh`]
//! backend implements them over libssh2; [`fake`] is a scripted in-process
//! implementation for tests and demos.

pub mod fake;
#[cfg(feature = "ssh")]
pub mod ssh;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connection::ConnectParams;
use crate::execution::{ExecOutput, RemoteCommand};
use crate::session::ShellEventSink;
use crate::Result;

pub use fake::FakeTransport;
#[cfg(feature = "ssh")]
pub use ssh::SshTransport;

/// Opens connections.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Establish and authenticate a connection.
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn RemoteConnection>>;
}

/// One live, authenticated connection.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Run a command to completion.
    async fn exec(&self, command: &RemoteCommand) -> Result<ExecOutput>;

    /// Download `remote` into the local file `local`.
    async fn get_file(&self, remote: &str, local: &Path) -> Result<()>;

    /// Upload the local file `local` to `remote`.
    async fn put_file(&self, local: &Path, remote: &str) -> Result<()>;

    /// List a remote directory.
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Stat a remote path.
    async fn stat(&self, path: &str) -> Result<FileEntry>;

    /// Open an interactive channel. Data and close events go to `events`.
    async fn request_shell(
        &self,
        request: &ShellRequest,
        events: ShellEventSink,
    ) -> Result<Box<dyn ShellChannel>>;

    /// Release the connection.
    async fn disconnect(&self) -> Result<()>;
}

/// Input side of an interactive channel.
#[async_trait]
pub trait ShellChannel: Send + Sync {
    /// Write raw input.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Ask the remote side to close the channel.
    async fn close(&self) -> Result<()>;
}

/// Parameters for an interactive channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    /// Program to run instead of the login shell. `None` starts the
    /// account's default shell.
    pub shell: Option<String>,
    pub cols: u16,
    pub rows: u16,
    /// Terminal type announced in the pty request.
    pub term: String,
}

impl ShellRequest {
    pub fn new(shell: Option<String>, cols: u16, rows: u16) -> Self {
        Self {
            shell,
            cols,
            rows,
            term: "xterm-256color".to_string(),
        }
    }
}

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One directory entry or stat result, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub kind: FileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Permission bits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, kind: FileKind) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path),
            path,
            kind,
            size: None,
            mode: None,
            modified: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the modification time from seconds since the Unix epoch.
    pub fn with_mtime(mut self, secs: i64) -> Self {
        self.modified = DateTime::from_timestamp(secs, 0);
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Last path component, or the path itself for `/` and friends.
pub(crate) fn file_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name.to_string(),
        _ if trimmed.is_empty() => path.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Join a remote directory and an entry name with `/`.
pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/var/log/syslog"), "syslog");
        assert_eq!(file_name("/var/log/"), "log");
        assert_eq!(file_name("relative"), "relative");
        assert_eq!(file_name("/"), "/");
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/tmp", "a"), "/tmp/a");
        assert_eq!(join_remote("/tmp/", "a"), "/tmp/a");
    }

    #[test]
    fn test_file_entry_builder() {
        let entry = FileEntry::new("/etc/hosts", FileKind::File)
            .with_size(42)
            .with_mode(0o644)
            .with_mtime(0);
        assert_eq!(entry.name, "hosts");
        assert_eq!(entry.size, Some(42));
        assert_eq!(entry.mode, Some(0o644));
        assert_eq!(entry.modified.unwrap().timestamp(), 0);
        assert!(!entry.is_dir());
    }

    #[test]
    fn test_file_entry_serialization() {
        let entry = FileEntry::new("/srv", FileKind::Directory);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "directory");
        assert!(json.get("size").is_none());
    }

    #[test]
    fn test_shell_request_defaults() {
        let req = ShellRequest::new(None, 80, 24);
        assert_eq!(req.term, "xterm-256color");
        assert!(req.shell.is_none());
    }
}
