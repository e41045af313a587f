//! libssh2-backed transport.
//!
//! libssh2 calls block, so every operation runs on tokio's blocking pool.
//! After authentication the session is switched to non-blocking mode and
//! each call is retried on `EAGAIN`; this lets an interactive channel pump
//! output on its own worker while one-shot commands and SFTP transfers share
//! the same session.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use ssh2::{Channel, ErrorCode, FileStat, Session};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use super::{
    file_name, join_remote, FileEntry, FileKind, RemoteConnection, RemoteShell, ShellChannel,
    ShellRequest,
};
use crate::connection::{AuthMethod, ConnectParams};
use crate::error::HubError;
use crate::execution::{ExecOutput, RemoteCommand};
use crate::session::ShellEventSink;
use crate::Result;

/// libssh2 `LIBSSH2_ERROR_EAGAIN`.
const ERROR_EAGAIN: i32 = -37;

/// Pause between polls when a non-blocking call had nothing to do.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Read buffer size for channels and SFTP files.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Default TCP connect plus handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport that opens real SSH connections.
#[derive(Debug, Clone)]
pub struct SshTransport {
    connect_timeout: Duration,
}

impl SshTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the default connect timeout used when the parameters carry none.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteShell for SshTransport {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn RemoteConnection>> {
        let params = params.clone();
        let timeout = params.connect_timeout.unwrap_or(self.connect_timeout);
        let target = params.target();

        let session = tokio::task::spawn_blocking(move || open_session(&params, timeout))
            .await
            .map_err(|e| HubError::ConnectionFailed(format!("connect worker failed: {}", e)))??;

        debug!("SSH session established to {}", target);
        Ok(Arc::new(SshConnection { session, target }))
    }
}

fn open_session(params: &ConnectParams, timeout: Duration) -> Result<Session> {
    let connect_err = |what: &str, e: &dyn std::fmt::Display| {
        HubError::ConnectionFailed(format!("{} {}: {}", what, params.target(), e))
    };

    let addr = (params.host.as_str(), params.port)
        .to_socket_addrs()
        .map_err(|e| connect_err("cannot resolve", &e))?
        .next()
        .ok_or_else(|| {
            HubError::ConnectionFailed(format!("no address found for {}", params.host))
        })?;

    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| connect_err("cannot reach", &e))?;

    let mut session = Session::new().map_err(|e| connect_err("cannot start session for", &e))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| connect_err("handshake failed with", &e))?;

    match &params.auth {
        AuthMethod::Password(password) => session
            .userauth_password(&params.username, password.expose_secret())
            .map_err(|e| connect_err("password authentication failed for", &e))?,
        AuthMethod::PrivateKey { path, passphrase } => session
            .userauth_pubkey_file(
                &params.username,
                None,
                path,
                passphrase.as_ref().map(|p| p.expose_secret()),
            )
            .map_err(|e| connect_err("key authentication failed for", &e))?,
    }

    if !session.authenticated() {
        return Err(HubError::ConnectionFailed(format!(
            "authentication rejected for {}",
            params.target()
        )));
    }

    session.set_timeout(0);
    session.set_blocking(false);
    Ok(session)
}

fn would_block(e: &ssh2::Error) -> bool {
    e.code() == ErrorCode::Session(ERROR_EAGAIN)
}

/// Retry a libssh2 call until it stops reporting `EAGAIN`.
fn retry<T>(mut op: impl FnMut() -> std::result::Result<T, ssh2::Error>) -> std::result::Result<T, ssh2::Error> {
    loop {
        match op() {
            Err(e) if would_block(&e) => std::thread::sleep(POLL_INTERVAL),
            other => return other,
        }
    }
}

fn op_err(what: &str, e: impl std::fmt::Display) -> HubError {
    HubError::OperationFailed(format!("{}: {}", what, e))
}

/// Read until EOF from a non-blocking reader.
fn read_to_end(reader: &mut impl Read, out: &mut impl Write) -> io::Result<u64> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                out.write_all(&buf[..n])?;
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(POLL_INTERVAL),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Write all of `data` to a non-blocking writer.
fn write_all(writer: &mut impl Write, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "channel closed")),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(POLL_INTERVAL),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(e),
        }
    }
}

/// Non-blocking single read. `Ok(None)` means nothing available yet.
fn poll_read(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<usize>> {
    match reader.read(buf) {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

fn entry_from_stat(path: String, stat: &FileStat) -> FileEntry {
    let file_type = stat.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };

    let mut entry = FileEntry::new(path, kind);
    if let Some(size) = stat.size {
        entry = entry.with_size(size);
    }
    if let Some(perm) = stat.perm {
        entry = entry.with_mode(perm & 0o7777);
    }
    if let Some(mtime) = stat.mtime {
        entry = entry.with_mtime(i64::try_from(mtime).unwrap_or(i64::MAX));
    }
    entry
}

struct SshConnection {
    session: Session,
    target: String,
}

impl SshConnection {
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Session) -> Result<T> + Send + 'static,
    {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || f(session))
            .await
            .map_err(|e| HubError::OperationFailed(format!("ssh worker failed: {}", e)))?
    }
}

fn exec_blocking(session: &Session, line: &str, timeout: Option<Duration>) -> Result<ExecOutput> {
    let started = Instant::now();
    let mut channel = retry(|| session.channel_session()).map_err(|e| op_err("open channel", e))?;
    retry(|| channel.exec(line)).map_err(|e| op_err("exec", e))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let mut progressed = false;

        if let Some(n) = poll_read(&mut channel, &mut buf).map_err(|e| op_err("read stdout", e))? {
            stdout.extend_from_slice(&buf[..n]);
            progressed |= n > 0;
        }
        if let Some(n) =
            poll_read(&mut channel.stderr(), &mut buf).map_err(|e| op_err("read stderr", e))?
        {
            stderr.extend_from_slice(&buf[..n]);
            progressed |= n > 0;
        }

        if channel.eof() && !progressed {
            break;
        }

        if let Some(limit) = timeout {
            if started.elapsed() > limit {
                let _ = retry(|| channel.close());
                return Ok(ExecOutput::timeout(
                    String::from_utf8_lossy(&stdout),
                    String::from_utf8_lossy(&stderr),
                    started.elapsed(),
                ));
            }
        }

        if !progressed {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    retry(|| channel.wait_close()).map_err(|e| op_err("close channel", e))?;
    let exit_code = channel.exit_status().map_err(|e| op_err("exit status", e))?;

    Ok(ExecOutput::new(
        exit_code,
        String::from_utf8_lossy(&stdout),
        String::from_utf8_lossy(&stderr),
    )
    .with_duration(started.elapsed()))
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn exec(&self, command: &RemoteCommand) -> Result<ExecOutput> {
        let line = command.shell_line()?;
        let timeout = command.timeout;
        debug!("exec on {}: {}", self.target, line);
        self.blocking(move |session| exec_blocking(&session, &line, timeout))
            .await
    }

    async fn get_file(&self, remote: &str, local: &Path) -> Result<()> {
        let remote = remote.to_string();
        let local = local.to_path_buf();
        self.blocking(move |session| {
            let sftp = retry(|| session.sftp()).map_err(|e| op_err("open sftp", e))?;
            let mut file = retry(|| sftp.open(Path::new(&remote)))
                .map_err(|e| op_err(&format!("open {}", remote), e))?;
            let mut out = std::fs::File::create(&local)?;
            let bytes = read_to_end(&mut file, &mut out)
                .map_err(|e| op_err(&format!("read {}", remote), e))?;
            trace!("downloaded {} bytes from {}", bytes, remote);
            Ok(())
        })
        .await
    }

    async fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        let remote = remote.to_string();
        let local = local.to_path_buf();
        self.blocking(move |session| {
            let sftp = retry(|| session.sftp()).map_err(|e| op_err("open sftp", e))?;
            let mut input = std::fs::File::open(&local)?;
            let mut file = retry(|| sftp.create(Path::new(&remote)))
                .map_err(|e| op_err(&format!("create {}", remote), e))?;
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                let n = input.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                write_all(&mut file, &buf[..n])
                    .map_err(|e| op_err(&format!("write {}", remote), e))?;
            }
            Ok(())
        })
        .await
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = path.to_string();
        self.blocking(move |session| {
            let sftp = retry(|| session.sftp()).map_err(|e| op_err("open sftp", e))?;
            let entries = retry(|| sftp.readdir(Path::new(&path)))
                .map_err(|e| op_err(&format!("list {}", path), e))?;

            let mut listed: Vec<FileEntry> = entries
                .iter()
                .map(|(entry_path, stat): &(PathBuf, FileStat)| {
                    let name = file_name(&entry_path.to_string_lossy());
                    entry_from_stat(join_remote(&path, &name), stat)
                })
                .collect();
            listed.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(listed)
        })
        .await
    }

    async fn stat(&self, path: &str) -> Result<FileEntry> {
        let path = path.to_string();
        self.blocking(move |session| {
            let sftp = retry(|| session.sftp()).map_err(|e| op_err("open sftp", e))?;
            let stat = retry(|| sftp.lstat(Path::new(&path)))
                .map_err(|e| op_err(&format!("stat {}", path), e))?;
            Ok(entry_from_stat(path, &stat))
        })
        .await
    }

    async fn request_shell(
        &self,
        request: &ShellRequest,
        events: ShellEventSink,
    ) -> Result<Box<dyn ShellChannel>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let session = self.session.clone();
        let request = request.clone();
        let target = self.target.clone();

        // Shell pumps run on their own threads, outside the blocking pool
        // that exec and SFTP calls share.
        std::thread::Builder::new()
            .name(format!("ssh-shell-{}", target))
            .spawn(move || {
                let channel = match open_shell(&session, &request) {
                    Ok(channel) => {
                        let _ = ready_tx.send(Ok(()));
                        channel
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                pump_shell(channel, input_rx, &events);
                events.closed();
                debug!("shell channel on {} finished", target);
            })
            .map_err(|e| HubError::OperationFailed(format!("spawn shell worker: {}", e)))?;

        ready_rx
            .await
            .map_err(|_| HubError::OperationFailed("shell worker exited".into()))??;

        Ok(Box::new(SshShellChannel { input: input_tx }))
    }

    async fn disconnect(&self) -> Result<()> {
        let target = self.target.clone();
        self.blocking(move |session| {
            retry(|| session.disconnect(None, "closed by client", None))
                .map_err(|e| op_err(&format!("disconnect {}", target), e))
        })
        .await
    }
}

fn open_shell(session: &Session, request: &ShellRequest) -> Result<Channel> {
    let mut channel = retry(|| session.channel_session()).map_err(|e| op_err("open channel", e))?;
    let dims = (u32::from(request.cols), u32::from(request.rows), 0, 0);
    retry(|| channel.request_pty(&request.term, None, Some(dims)))
        .map_err(|e| op_err("request pty", e))?;
    match &request.shell {
        Some(program) => retry(|| channel.exec(program)),
        None => retry(|| channel.shell()),
    }
    .map_err(|e| op_err("start shell", e))?;
    Ok(channel)
}

enum ShellInput {
    Write(Vec<u8>, oneshot::Sender<Result<()>>),
    Close,
}

/// Forward channel output to the sink and queued input to the channel
/// until either side closes.
fn pump_shell(
    mut channel: Channel,
    mut input: mpsc::UnboundedReceiver<ShellInput>,
    events: &ShellEventSink,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let mut progressed = false;

        loop {
            match input.try_recv() {
                Ok(ShellInput::Write(data, ack)) => {
                    let result = write_all(&mut channel, &data).map_err(|e| op_err("write", e));
                    let _ = ack.send(result);
                    progressed = true;
                }
                Ok(ShellInput::Close) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    let _ = retry(|| channel.send_eof());
                    let _ = retry(|| channel.close());
                    return;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
            }
        }

        match poll_read(&mut channel, &mut buf) {
            Ok(Some(n)) if n > 0 => {
                trace!("shell channel: read {} bytes", n);
                events.data(&buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("shell channel read failed: {}", e);
                return;
            }
        }

        if let Ok(Some(n)) = poll_read(&mut channel.stderr(), &mut buf) {
            if n > 0 {
                events.data(&buf[..n]);
                progressed = true;
            }
        }

        if channel.eof() && !progressed {
            let _ = retry(|| channel.close());
            return;
        }

        if !progressed {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

struct SshShellChannel {
    input: mpsc::UnboundedSender<ShellInput>,
}

#[async_trait]
impl ShellChannel for SshShellChannel {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.input
            .send(ShellInput::Write(data.to_vec(), ack_tx))
            .map_err(|_| HubError::OperationFailed("shell channel closed".into()))?;
        ack_rx
            .await
            .map_err(|_| HubError::OperationFailed("shell channel closed".into()))?
    }

    async fn close(&self) -> Result<()> {
        // The worker may already be gone if the remote side closed first.
        let _ = self.input.send(ShellInput::Close);
        Ok(())
    }
}
