//! Interactive shell sessions bound to registered connections.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{OutputBuffer, ShellEventSink, ShellState, TypingPacer};
use crate::connection::{Connection, ConnectionRegistry};
use crate::error::{EntityKind, HubError};
use crate::registry::Registry;
use crate::transport::{ShellChannel, ShellRequest};
use crate::Result;

/// Default terminal width.
pub const DEFAULT_COLS: u16 = 80;
/// Default terminal height.
pub const DEFAULT_ROWS: u16 = 24;
/// Default wait for `read_output`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Options for starting a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOptions {
    /// Program to run instead of the login shell.
    pub shell: Option<String>,
    pub cols: u16,
    pub rows: u16,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            shell: None,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

/// One interactive shell.
pub struct ShellSession {
    pub id: String,
    pub connection_id: String,
    pub options: ShellOptions,
    state: Mutex<ShellState>,
    buffer: Arc<OutputBuffer>,
    channel: Box<dyn ShellChannel>,
    connection: Weak<Connection>,
    pub created_at: DateTime<Utc>,
}

impl ShellSession {
    /// Current state. A session whose channel closed on the remote side is
    /// reported as `Inactive`.
    pub fn state(&self) -> Result<ShellState> {
        let mut state = self.state.lock().map_err(|_| HubError::LockPoisoned)?;
        if *state == ShellState::Active && !self.buffer.is_active() {
            state.transition_to(ShellState::Inactive)?;
            debug!("Shell session {} became inactive", self.id);
        }
        Ok(*state)
    }

    /// Whether `connection` is the instance this session was opened on. A
    /// later connection registered under the same id does not match.
    pub fn is_bound_to(&self, connection: &Arc<Connection>) -> bool {
        std::ptr::eq(self.connection.as_ptr(), Arc::as_ptr(connection))
    }

    fn transition(&self, target: ShellState) -> Result<()> {
        self.state
            .lock()
            .map_err(|_| HubError::LockPoisoned)?
            .transition_to(target)
    }

    pub fn info(&self) -> Result<ShellSessionInfo> {
        Ok(ShellSessionInfo {
            id: self.id.clone(),
            connection_id: self.connection_id.clone(),
            state: self.state()?,
            shell: self.options.shell.clone(),
            cols: self.options.cols,
            rows: self.options.rows,
            buffered_bytes: self.buffer.len(),
            created_at: self.created_at,
        })
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Serializable session summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellSessionInfo {
    pub id: String,
    pub connection_id: String,
    pub state: ShellState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    pub cols: u16,
    pub rows: u16,
    pub buffered_bytes: usize,
    pub created_at: DateTime<Utc>,
}

/// Owns every interactive session, keyed by caller-chosen id.
pub struct ShellSessionManager {
    connections: Arc<ConnectionRegistry>,
    sessions: Registry<ShellSession>,
    typing: TypingPacer,
}

impl ShellSessionManager {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            connections,
            sessions: Registry::new(EntityKind::Session),
            typing: TypingPacer::default(),
        }
    }

    /// Set the pacing used by `send_input` with typing simulation.
    pub fn with_typing(mut self, typing: TypingPacer) -> Self {
        self.typing = typing;
        self
    }

    /// Open an interactive channel on `connection_id` and register it as
    /// `session_id`.
    pub async fn start(
        &self,
        session_id: &str,
        connection_id: &str,
        options: ShellOptions,
    ) -> Result<Arc<ShellSession>> {
        let connection = self.connections.get(connection_id)?;
        let reservation = self.sessions.reserve(session_id)?;

        let mut state = ShellState::Created;
        let buffer = Arc::new(OutputBuffer::new());
        let request = ShellRequest::new(options.shell.clone(), options.cols, options.rows);

        let channel = connection
            .handle()
            .request_shell(&request, ShellEventSink::new(Arc::clone(&buffer)))
            .await
            .map_err(|e| match e {
                HubError::OperationFailed(_) => e,
                other => HubError::OperationFailed(other.to_string()),
            })?;
        state.transition_to(ShellState::Active)?;

        let session = reservation.commit(ShellSession {
            id: session_id.to_string(),
            connection_id: connection_id.to_string(),
            options,
            state: Mutex::new(state),
            buffer,
            channel,
            connection: Arc::downgrade(&connection),
            created_at: Utc::now(),
        })?;

        info!(
            "Shell session {} started on connection {} ({}x{})",
            session_id, connection_id, request.cols, request.rows
        );
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<ShellSession>> {
        self.sessions.get(session_id)
    }

    /// Write `text` to the session, optionally one character at a time.
    ///
    /// Write failures leave the session registered.
    pub async fn send_input(&self, session_id: &str, text: &str, simulate_typing: bool) -> Result<()> {
        let session = self.get(session_id)?;

        let state = session.state()?;
        if !state.accepts_input() {
            return Err(HubError::InvalidState(format!(
                "shell session {} is {:?} and does not accept input",
                session_id, state
            )));
        }
        if !self.is_attached(&session)? {
            detach(&session).await;
            return Err(HubError::InvalidState(format!(
                "connection {} of shell session {} is closed",
                session.connection_id, session_id
            )));
        }

        let written = if simulate_typing {
            self.typing.type_into(session.channel.as_ref(), text).await
        } else {
            session.channel.write(text.as_bytes()).await
        };
        written.map_err(|e| match e {
            HubError::OperationFailed(_) => e,
            other => HubError::OperationFailed(other.to_string()),
        })?;

        debug!("Shell session {}: sent {} bytes", session_id, text.len());
        Ok(())
    }

    /// Buffered output, waiting up to `timeout` if there is none yet.
    pub async fn read_output(&self, session_id: &str, timeout: Duration, clear: bool) -> Result<String> {
        let session = self.get(session_id)?;
        self.read_from(&session, timeout, clear).await
    }

    /// Like `read_output`, on a session handle the caller already holds.
    ///
    /// A session whose connection is gone is made inactive first, so the
    /// read returns what is buffered without waiting.
    pub async fn read_from(&self, session: &ShellSession, timeout: Duration, clear: bool) -> Result<String> {
        if session.buffer.is_active() && !self.is_attached(session)? {
            detach(session).await;
        }
        Ok(session.buffer.read(timeout, clear).await)
    }

    /// Whether the connection the session was opened on is still registered.
    fn is_attached(&self, session: &ShellSession) -> Result<bool> {
        match self.connections.get(&session.connection_id) {
            Ok(current) => Ok(session.is_bound_to(&current)),
            Err(HubError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Make every session whose connection was closed inactive. Their
    /// buffered output stays readable until the session is closed.
    /// Returns how many sessions changed.
    pub async fn detach_orphans(&self) -> Result<usize> {
        let mut detached = 0;
        for (_, session) in self.sessions.snapshot()? {
            if session.buffer.is_active() && !self.is_attached(&session)? {
                detach(&session).await;
                detached += 1;
            }
        }
        Ok(detached)
    }

    /// Close the channel and remove the session.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        let session = self.sessions.remove(session_id)?;
        shut(&session).await;
        info!("Shell session {} closed", session_id);
        Ok(())
    }

    /// Summaries of every session, sorted by id.
    pub fn list(&self) -> Result<Vec<ShellSessionInfo>> {
        self.sessions
            .snapshot()?
            .into_iter()
            .map(|(_, session)| session.info())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.count()
    }

    /// Close every session, best-effort. Returns how many were closed.
    pub async fn close_all(&self) -> Result<usize> {
        let drained = self.sessions.drain()?;
        let count = drained.len();
        for (id, session) in drained {
            shut(&session).await;
            info!("Shell session {} closed", id);
        }
        Ok(count)
    }
}

async fn detach(session: &ShellSession) {
    if let Err(e) = session.channel.close().await {
        debug!("Shell session {}: closing orphaned channel: {}", session.id, e);
    }
    session.buffer.close();
    info!(
        "Shell session {} lost connection {}",
        session.id, session.connection_id
    );
}

async fn shut(session: &ShellSession) {
    if session.buffer.is_active() {
        if let Err(e) = session.channel.close().await {
            warn!("Error closing shell channel {}: {}", session.id, e);
        }
    }
    session.buffer.close();
    if let Err(e) = session.transition(ShellState::Closed) {
        debug!("Shell session {}: {}", session.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectParams;
    use crate::transport::FakeTransport;

    async fn setup() -> (FakeTransport, Arc<ConnectionRegistry>, ShellSessionManager) {
        let fake = FakeTransport::new();
        let connections = Arc::new(ConnectionRegistry::new(Arc::new(fake.clone())));
        connections
            .open("c", ConnectParams::password("h", "u", "p").unwrap())
            .await
            .unwrap();
        let manager = ShellSessionManager::new(Arc::clone(&connections))
            .with_typing(TypingPacer::instant());
        (fake, connections, manager)
    }

    #[tokio::test]
    async fn test_start_requests_sized_channel() {
        let (fake, _, manager) = setup().await;
        let options = ShellOptions {
            shell: Some("/bin/bash".into()),
            cols: 120,
            rows: 40,
        };
        let session = manager.start("s", "c", options).await.unwrap();

        assert_eq!(session.state().unwrap(), ShellState::Active);
        let request = fake.shell_request(0).unwrap();
        assert_eq!((request.cols, request.rows), (120, 40));
        assert_eq!(request.shell.as_deref(), Some("/bin/bash"));
    }

    #[tokio::test]
    async fn test_start_unknown_connection_creates_nothing() {
        let (_, _, manager) = setup().await;
        let err = manager
            .start("s1", "missing", ShellOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound { kind: EntityKind::Connection, .. }));
        assert_eq!(manager.count(), 0);

        manager.start("s1", "c", ShellOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let (fake, _, manager) = setup().await;
        manager.start("s", "c", ShellOptions::default()).await.unwrap();
        let err = manager
            .start("s", "c", ShellOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::AlreadyExists { .. }));
        assert_eq!(fake.shell_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_channel_frees_id() {
        let (fake, _, manager) = setup().await;
        fake.fail_shell(Some("channel request denied"));
        let err = manager
            .start("s", "c", ShellOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::OperationFailed(_)));

        fake.fail_shell(None);
        manager.start("s", "c", ShellOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_input_plain_is_single_write() {
        let (fake, _, manager) = setup().await;
        manager.start("s", "c", ShellOptions::default()).await.unwrap();

        manager.send_input("s", "sudo ls\n", false).await.unwrap();
        assert_eq!(fake.shell_input(0), b"sudo ls\n");
        assert_eq!(fake.shell_writes(0), 1);
    }

    #[tokio::test]
    async fn test_send_input_typed_preserves_content() {
        let (fake, _, manager) = setup().await;
        manager.start("s", "c", ShellOptions::default()).await.unwrap();

        manager.send_input("s", "pässwörd\n", true).await.unwrap();
        assert_eq!(fake.shell_input(0), "pässwörd\n".as_bytes());
        assert_eq!(fake.shell_writes(0), "pässwörd\n".chars().count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_delay_is_applied() {
        let (fake, connections, _) = setup().await;
        let manager = ShellSessionManager::new(connections).with_typing(TypingPacer::new(
            Duration::from_millis(50),
            Duration::from_millis(150),
        ));
        manager.start("s", "c", ShellOptions::default()).await.unwrap();

        let started = tokio::time::Instant::now();
        manager.send_input("s", "abc", true).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed <= Duration::from_millis(300));
        assert_eq!(fake.shell_input(0), b"abc");
    }

    #[tokio::test]
    async fn test_remote_close_makes_session_inactive() {
        let (fake, _, manager) = setup().await;
        let session = manager.start("s", "c", ShellOptions::default()).await.unwrap();
        let events = fake.shell_events(0).unwrap();

        events.data(b"logout\r\n");
        events.closed();

        assert_eq!(session.state().unwrap(), ShellState::Inactive);
        let err = manager.send_input("s", "ls\n", false).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidState(_)));

        let text = manager
            .read_output("s", Duration::from_secs(5), true)
            .await
            .unwrap();
        assert_eq!(text, "logout\r\n");
        assert_eq!(manager.count(), 1);
    }

    #[tokio::test]
    async fn test_send_after_connection_closed() {
        let (_, connections, manager) = setup().await;
        manager.start("s", "c", ShellOptions::default()).await.unwrap();
        connections.close("c").await.unwrap();

        let err = manager.send_input("s", "ls\n", false).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_reconnect_under_same_id_does_not_revive_session() {
        let (fake, connections, manager) = setup().await;
        let session = manager.start("s", "c", ShellOptions::default()).await.unwrap();
        connections.close("c").await.unwrap();
        let fresh = connections
            .open("c", ConnectParams::password("h2", "u", "p").unwrap())
            .await
            .unwrap();
        assert!(!session.is_bound_to(&fresh));

        let err = manager.send_input("s", "whoami\n", false).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidState(_)));
        assert!(fake.shell_input(0).is_empty());
        assert_eq!(session.state().unwrap(), ShellState::Inactive);

        manager.start("s2", "c", ShellOptions::default()).await.unwrap();
        manager.send_input("s2", "whoami\n", false).await.unwrap();
        assert_eq!(fake.shell_input(1), b"whoami\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_connection_closed_returns_immediately() {
        let (fake, connections, manager) = setup().await;
        let session = manager.start("s", "c", ShellOptions::default()).await.unwrap();
        fake.shell_events(0).unwrap().data(b"last words");
        connections.close("c").await.unwrap();

        let started = tokio::time::Instant::now();
        let text = manager
            .read_output("s", Duration::from_secs(300), true)
            .await
            .unwrap();
        assert_eq!(text, "last words");
        assert_eq!(
            manager
                .read_output("s", Duration::from_secs(300), true)
                .await
                .unwrap(),
            ""
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(session.state().unwrap(), ShellState::Inactive);
        assert!(fake.shell_closed(0));
    }

    #[tokio::test]
    async fn test_detach_orphans_only_touches_closed_connections() {
        let (fake, connections, manager) = setup().await;
        connections
            .open("d", ConnectParams::password("h", "u", "p").unwrap())
            .await
            .unwrap();
        let gone = manager.start("s1", "c", ShellOptions::default()).await.unwrap();
        let kept = manager.start("s2", "d", ShellOptions::default()).await.unwrap();

        connections.close("c").await.unwrap();
        assert_eq!(manager.detach_orphans().await.unwrap(), 1);
        assert_eq!(manager.detach_orphans().await.unwrap(), 0);

        assert_eq!(gone.state().unwrap(), ShellState::Inactive);
        assert_eq!(kept.state().unwrap(), ShellState::Active);
        assert!(!fake.shell_closed(1));
        assert_eq!(manager.count(), 2);
    }

    #[tokio::test]
    async fn test_close_twice() {
        let (fake, _, manager) = setup().await;
        let session = manager.start("s", "c", ShellOptions::default()).await.unwrap();

        manager.close("s").await.unwrap();
        assert!(fake.shell_closed(0));
        assert_eq!(session.state().unwrap(), ShellState::Closed);

        let err = manager.close("s").await.unwrap_err();
        assert!(matches!(err, HubError::NotFound { kind: EntityKind::Session, .. }));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (_, _, manager) = setup().await;
        assert!(matches!(
            manager.send_input("x", "a", false).await.unwrap_err(),
            HubError::NotFound { .. }
        ));
        assert!(matches!(
            manager
                .read_output("x", Duration::from_millis(1), true)
                .await
                .unwrap_err(),
            HubError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_list_and_close_all() {
        let (_, _, manager) = setup().await;
        manager.start("b", "c", ShellOptions::default()).await.unwrap();
        manager.start("a", "c", ShellOptions::default()).await.unwrap();

        let listed = manager.list().unwrap();
        assert_eq!(listed[0].id, "a");
        assert_eq!(listed[1].state, ShellState::Active);

        assert_eq!(manager.close_all().await.unwrap(), 2);
        assert_eq!(manager.count(), 0);
    }
}
