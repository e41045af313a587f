//! Remote command representation.

use std::time::Duration;

use crate::error::HubError;
use crate::Result;

/// A one-shot command to run on a remote connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// The command line to execute.
    pub command_line: String,
    /// Working directory override. The connection's cached working
    /// directory is never applied implicitly.
    pub working_dir: Option<String>,
    /// Maximum execution time.
    pub timeout: Option<Duration>,
}

impl RemoteCommand {
    /// Create a new command with the given command line.
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// The line handed to the remote shell, with the working directory
    /// applied as `cd <dir> && <command>`.
    pub fn shell_line(&self) -> Result<String> {
        match &self.working_dir {
            Some(dir) => Ok(format!("cd {} && {}", quote(dir)?, self.command_line)),
            None => Ok(self.command_line.clone()),
        }
    }
}

/// Quote one argument for a POSIX shell.
pub fn quote(arg: &str) -> Result<String> {
    shlex::try_quote(arg)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| HubError::InvalidParams(format!("cannot quote {:?}: {}", arg, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_new() {
        let cmd = RemoteCommand::new("uptime");
        assert_eq!(cmd.command_line, "uptime");
        assert!(cmd.working_dir.is_none());
        assert!(cmd.timeout.is_none());
        assert_eq!(cmd.shell_line().unwrap(), "uptime");
    }

    #[test]
    fn test_command_builder_chain() {
        let cmd = RemoteCommand::new("make")
            .working_dir("/srv/app")
            .timeout(Duration::from_secs(60));

        assert_eq!(cmd.working_dir.as_deref(), Some("/srv/app"));
        assert_eq!(cmd.timeout, Some(Duration::from_secs(60)));
        assert_eq!(cmd.shell_line().unwrap(), "cd /srv/app && make");
    }

    #[test]
    fn test_working_dir_is_quoted() {
        let cmd = RemoteCommand::new("ls").working_dir("/tmp/it's here");
        let line = cmd.shell_line().unwrap();
        assert!(line.starts_with("cd '"));
        assert!(line.ends_with(" && ls"));
        assert!(!line.contains("cd /tmp/it's here"));
    }

    #[test]
    fn test_quote_rejects_nul() {
        assert!(matches!(quote("a\0b"), Err(HubError::InvalidParams(_))));
    }
}
