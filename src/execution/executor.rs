//! One-shot remote command execution.

use std::sync::Arc;

use tracing::debug;

use super::{ExecOutput, RemoteCommand};
use crate::connection::ConnectionRegistry;
use crate::error::HubError;
use crate::security::sanitize_for_display;
use crate::Result;

/// Runs commands on registered connections.
pub struct CommandExecutor {
    connections: Arc<ConnectionRegistry>,
}

impl CommandExecutor {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    /// Run `command` on `connection_id` and return its output verbatim.
    ///
    /// Only `command.working_dir` is applied. The connection's cached working
    /// directory is not used unless the caller passes it explicitly.
    pub async fn execute(&self, connection_id: &str, command: &RemoteCommand) -> Result<ExecOutput> {
        let connection = self.connections.get(connection_id)?;
        if command.command_line.trim().is_empty() {
            return Err(HubError::InvalidParams("command must not be empty".into()));
        }

        debug!(
            "Executing on {}: {} (cwd: {:?})",
            connection_id,
            sanitize_for_display(&command.command_line),
            command.working_dir
        );
        let output = connection.handle().exec(command).await?;

        connection
            .context()?
            .record_execution(command.command_line.clone(), output.exit_code);

        debug!(
            "Command on {} finished with {:?} in {:?}",
            connection_id, output.exit_code, output.duration
        );
        Ok(output)
    }
}
