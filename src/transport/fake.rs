//! Scripted in-process transport.
//!
//! Behaves like a tiny remote host: an in-memory file tree, a handful of
//! understood commands (`pwd`, `cd -- <dir> && pwd`, `mkdir -p -- <dir>`),
//! canned replies for anything else, and interactive channels whose data and
//! close events are driven by the caller. Every call is recorded so tests can
//! assert on what the hub asked for.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{FileEntry, FileKind, RemoteConnection, RemoteShell, ShellChannel, ShellRequest};
use crate::connection::ConnectParams;
use crate::error::HubError;
use crate::execution::{ExecOutput, RemoteCommand};
use crate::session::ShellEventSink;
use crate::Result;

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Node>,
    replies: HashMap<String, ExecOutput>,
    executed: Vec<String>,
    connects: Vec<String>,
    disconnects: Vec<String>,
    local_paths: Vec<PathBuf>,
    shells: Vec<FakeShell>,
    fail_connect: Option<String>,
    fail_put: Option<String>,
    fail_get: Option<String>,
    fail_shell: Option<String>,
    fail_disconnect: Option<String>,
    echo: bool,
}

impl State {
    fn ensure_dirs(&mut self, path: &str) {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            self.files.entry(current.clone()).or_insert(Node::Dir);
        }
        self.files.entry("/".to_string()).or_insert(Node::Dir);
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.files.get(normalize(path).as_str()), Some(Node::Dir))
    }

    fn entry(&self, path: &str) -> Option<FileEntry> {
        let path = normalize(path);
        self.files.get(&path).map(|node| match node {
            Node::Dir => FileEntry::new(path.clone(), FileKind::Directory).with_mode(0o755),
            Node::File(data) => FileEntry::new(path.clone(), FileKind::File)
                .with_size(data.len() as u64)
                .with_mode(0o644),
        })
    }
}

#[derive(Debug)]
struct FakeShell {
    request: ShellRequest,
    sink: ShellEventSink,
    input: Vec<u8>,
    writes: usize,
    closed: bool,
}

fn normalize(path: &str) -> String {
    if path == "/" {
        return path.to_string();
    }
    path.trim_end_matches('/').to_string()
}

fn parent(path: &str) -> String {
    match normalize(path).rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((dir, _)) => dir.to_string(),
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scripted transport. Cloning shares the same simulated host.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    shared: Arc<Shared>,
}

impl FakeTransport {
    pub fn new() -> Self {
        let transport = Self::default();
        transport.add_dir("/");
        transport
    }

    /// Create a directory and its parents.
    pub fn add_dir(&self, path: &str) {
        self.shared.lock().ensure_dirs(path);
    }

    /// Create a file, creating parent directories as needed.
    pub fn add_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let mut state = self.shared.lock();
        state.ensure_dirs(&parent(path));
        state
            .files
            .insert(normalize(path), Node::File(contents.into()));
    }

    /// Contents of a remote file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.shared.lock().files.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.shared.lock().is_dir(path)
    }

    /// Reply with `output` whenever exactly `line` is executed.
    pub fn reply(&self, line: impl Into<String>, output: ExecOutput) {
        self.shared.lock().replies.insert(line.into(), output);
    }

    /// Echo shell input back as output.
    pub fn set_echo(&self, echo: bool) {
        self.shared.lock().echo = echo;
    }

    pub fn fail_connect(&self, message: Option<&str>) {
        self.shared.lock().fail_connect = message.map(str::to_string);
    }

    pub fn fail_put(&self, message: Option<&str>) {
        self.shared.lock().fail_put = message.map(str::to_string);
    }

    pub fn fail_get(&self, message: Option<&str>) {
        self.shared.lock().fail_get = message.map(str::to_string);
    }

    pub fn fail_shell(&self, message: Option<&str>) {
        self.shared.lock().fail_shell = message.map(str::to_string);
    }

    pub fn fail_disconnect(&self, message: Option<&str>) {
        self.shared.lock().fail_disconnect = message.map(str::to_string);
    }

    /// Every shell line executed, in order.
    pub fn executed(&self) -> Vec<String> {
        self.shared.lock().executed.clone()
    }

    /// Targets (`user@host:port`) of successful connects, in order.
    pub fn connects(&self) -> Vec<String> {
        self.shared.lock().connects.clone()
    }

    /// Targets of disconnect calls, in order.
    pub fn disconnects(&self) -> Vec<String> {
        self.shared.lock().disconnects.clone()
    }

    /// Local paths handed to `get_file`/`put_file`, in order.
    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.shared.lock().local_paths.clone()
    }

    /// Number of interactive channels opened so far.
    pub fn shell_count(&self) -> usize {
        self.shared.lock().shells.len()
    }

    /// Request used to open the `index`-th channel.
    pub fn shell_request(&self, index: usize) -> Option<ShellRequest> {
        self.shared
            .lock()
            .shells
            .get(index)
            .map(|s| s.request.clone())
    }

    /// Event hooks of the `index`-th channel, to inject data or a close.
    pub fn shell_events(&self, index: usize) -> Option<ShellEventSink> {
        self.shared.lock().shells.get(index).map(|s| s.sink.clone())
    }

    /// Everything written to the `index`-th channel.
    pub fn shell_input(&self, index: usize) -> Vec<u8> {
        self.shared
            .lock()
            .shells
            .get(index)
            .map(|s| s.input.clone())
            .unwrap_or_default()
    }

    /// Number of separate writes made to the `index`-th channel.
    pub fn shell_writes(&self, index: usize) -> usize {
        self.shared
            .lock()
            .shells
            .get(index)
            .map(|s| s.writes)
            .unwrap_or(0)
    }

    pub fn shell_closed(&self, index: usize) -> bool {
        self.shared
            .lock()
            .shells
            .get(index)
            .map(|s| s.closed)
            .unwrap_or(false)
    }
}

#[async_trait]
impl RemoteShell for FakeTransport {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn RemoteConnection>> {
        let mut state = self.shared.lock();
        if let Some(message) = &state.fail_connect {
            return Err(HubError::ConnectionFailed(message.clone()));
        }
        let target = params.target();
        state.connects.push(target.clone());
        let home = format!("/home/{}", params.username);
        state.ensure_dirs(&home);

        Ok(Arc::new(FakeConnection {
            shared: Arc::clone(&self.shared),
            target,
            home,
        }))
    }
}

struct FakeConnection {
    shared: Arc<Shared>,
    target: String,
    home: String,
}

impl FakeConnection {
    fn run(&self, line: &str) -> ExecOutput {
        let mut state = self.shared.lock();
        state.executed.push(line.to_string());

        if let Some(reply) = state.replies.get(line) {
            return reply.clone();
        }

        let words = shlex::split(line).unwrap_or_default();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["pwd"] => ExecOutput::new(0, format!("{}\n", self.home), ""),
            ["cd", "--", dir, "&&", "pwd"] => {
                if state.is_dir(dir) {
                    ExecOutput::new(0, format!("{}\n", normalize(dir)), "")
                } else {
                    ExecOutput::new(1, "", format!("cd: {}: No such file or directory\n", dir))
                }
            }
            ["mkdir", "-p", "--", dir] => {
                state.ensure_dirs(dir);
                ExecOutput::new(0, "", "")
            }
            _ => ExecOutput::new(0, "", ""),
        }
    }
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn exec(&self, command: &RemoteCommand) -> Result<ExecOutput> {
        let line = command.shell_line()?;
        Ok(self.run(&line))
    }

    async fn get_file(&self, remote: &str, local: &Path) -> Result<()> {
        let data = {
            let mut state = self.shared.lock();
            state.local_paths.push(local.to_path_buf());
            if let Some(message) = &state.fail_get {
                return Err(HubError::OperationFailed(message.clone()));
            }
            match state.files.get(&normalize(remote)) {
                Some(Node::File(data)) => data.clone(),
                Some(Node::Dir) => {
                    return Err(HubError::OperationFailed(format!(
                        "{} is a directory",
                        remote
                    )))
                }
                None => {
                    return Err(HubError::OperationFailed(format!(
                        "no such file: {}",
                        remote
                    )))
                }
            }
        };
        tokio::fs::write(local, data).await?;
        Ok(())
    }

    async fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        {
            let mut state = self.shared.lock();
            state.local_paths.push(local.to_path_buf());
            if let Some(message) = &state.fail_put {
                return Err(HubError::OperationFailed(message.clone()));
            }
            if !state.is_dir(&parent(remote)) {
                return Err(HubError::OperationFailed(format!(
                    "no such directory: {}",
                    parent(remote)
                )));
            }
        }
        let data = tokio::fs::read(local).await?;
        self.shared
            .lock()
            .files
            .insert(normalize(remote), Node::File(data));
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>> {
        let state = self.shared.lock();
        if !state.is_dir(path) {
            return Err(HubError::OperationFailed(format!(
                "not a directory: {}",
                path
            )));
        }
        let dir = normalize(path);
        Ok(state
            .files
            .keys()
            .filter(|p| p.as_str() != dir && parent(p) == dir)
            .filter_map(|p| state.entry(p))
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileEntry> {
        self.shared
            .lock()
            .entry(path)
            .ok_or_else(|| HubError::OperationFailed(format!("no such file: {}", path)))
    }

    async fn request_shell(
        &self,
        request: &ShellRequest,
        events: ShellEventSink,
    ) -> Result<Box<dyn ShellChannel>> {
        let mut state = self.shared.lock();
        if let Some(message) = &state.fail_shell {
            return Err(HubError::OperationFailed(message.clone()));
        }
        let index = state.shells.len();
        state.shells.push(FakeShell {
            request: request.clone(),
            sink: events,
            input: Vec::new(),
            writes: 0,
            closed: false,
        });
        Ok(Box::new(FakeShellChannel {
            shared: Arc::clone(&self.shared),
            index,
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.shared.lock();
        state.disconnects.push(self.target.clone());
        match &state.fail_disconnect {
            Some(message) => Err(HubError::OperationFailed(message.clone())),
            None => Ok(()),
        }
    }
}

struct FakeShellChannel {
    shared: Arc<Shared>,
    index: usize,
}

#[async_trait]
impl ShellChannel for FakeShellChannel {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let (echo, sink) = {
            let mut state = self.shared.lock();
            let echo = state.echo;
            let shell = &mut state.shells[self.index];
            if shell.closed {
                return Err(HubError::OperationFailed("channel closed".into()));
            }
            shell.input.extend_from_slice(data);
            shell.writes += 1;
            (echo, shell.sink.clone())
        };
        if echo {
            sink.data(data);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let sink = {
            let mut state = self.shared.lock();
            let shell = &mut state.shells[self.index];
            shell.closed = true;
            shell.sink.clone()
        };
        sink.closed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutputBuffer;
    use std::time::Duration;

    fn params() -> ConnectParams {
        ConnectParams::password("fake-host", "deploy", "pw").unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_pwd() {
        let transport = FakeTransport::new();
        let conn = transport.connect(&params()).await.unwrap();

        let out = conn.exec(&RemoteCommand::new("pwd")).await.unwrap();
        assert_eq!(out.stdout, "/home/deploy\n");
        assert_eq!(transport.connects(), vec!["deploy@fake-host:22"]);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let transport = FakeTransport::new();
        transport.fail_connect(Some("auth rejected"));
        let err = transport.connect(&params()).await.err().unwrap();
        assert!(matches!(err, HubError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_enter_dir_probe() {
        let transport = FakeTransport::new();
        transport.add_dir("/var/log");
        let conn = transport.connect(&params()).await.unwrap();

        let ok = conn
            .exec(&RemoteCommand::new("cd -- /var/log && pwd"))
            .await
            .unwrap();
        assert_eq!(ok.exit_code, Some(0));

        let missing = conn
            .exec(&RemoteCommand::new("cd -- /nope && pwd"))
            .await
            .unwrap();
        assert_eq!(missing.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_scripted_reply_and_log() {
        let transport = FakeTransport::new();
        transport.reply("uname -a", ExecOutput::new(0, "Linux\n", ""));
        let conn = transport.connect(&params()).await.unwrap();

        let out = conn.exec(&RemoteCommand::new("uname -a")).await.unwrap();
        assert_eq!(out.stdout, "Linux\n");
        assert_eq!(transport.executed(), vec!["uname -a"]);
    }

    #[tokio::test]
    async fn test_read_dir_lists_children_only() {
        let transport = FakeTransport::new();
        transport.add_file("/srv/a.txt", "a");
        transport.add_file("/srv/sub/b.txt", "bb");
        let conn = transport.connect(&params()).await.unwrap();

        let entries = conn.read_dir("/srv").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);

        let stat = conn.stat("/srv/sub/b.txt").await.unwrap();
        assert_eq!(stat.size, Some(2));
    }

    #[tokio::test]
    async fn test_shell_echo() {
        let transport = FakeTransport::new();
        transport.set_echo(true);
        let conn = transport.connect(&params()).await.unwrap();

        let buffer = Arc::new(OutputBuffer::new());
        let channel = conn
            .request_shell(
                &ShellRequest::new(None, 80, 24),
                ShellEventSink::new(Arc::clone(&buffer)),
            )
            .await
            .unwrap();
        channel.write(b"ls\n").await.unwrap();

        assert_eq!(buffer.read(Duration::from_millis(10), true).await, "ls\n");
        assert_eq!(transport.shell_input(0), b"ls\n");

        channel.close().await.unwrap();
        assert!(transport.shell_closed(0));
        assert!(!buffer.is_active());
        assert!(channel.write(b"x").await.is_err());
    }
}
