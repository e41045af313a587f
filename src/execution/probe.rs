//! Commands used to probe remote working-directory state.

use super::command::{quote, RemoteCommand};
use crate::Result;

/// Builds probe commands and parses their output.
pub struct StateProbe;

impl StateProbe {
    /// Command printing the remote default working directory.
    pub fn cwd_command() -> RemoteCommand {
        RemoteCommand::new("pwd")
    }

    /// Command that succeeds only if `path` is an enterable directory, and
    /// prints its absolute form.
    pub fn enter_dir_command(path: &str) -> Result<RemoteCommand> {
        Ok(RemoteCommand::new(format!("cd -- {} && pwd", quote(path)?)))
    }

    /// Command creating `path` and any missing parents.
    pub fn mkdir_command(path: &str) -> Result<RemoteCommand> {
        Ok(RemoteCommand::new(format!("mkdir -p -- {}", quote(path)?)))
    }

    /// Parse CWD from command output.
    pub fn parse_cwd(output: &str) -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwd_command() {
        assert_eq!(StateProbe::cwd_command().command_line, "pwd");
    }

    #[test]
    fn test_enter_dir_command() {
        let cmd = StateProbe::enter_dir_command("/var/log").unwrap();
        assert_eq!(cmd.command_line, "cd -- /var/log && pwd");
        assert!(cmd.working_dir.is_none());
    }

    #[test]
    fn test_mkdir_command_quotes() {
        let cmd = StateProbe::mkdir_command("/data/my dir").unwrap();
        assert!(cmd.command_line.starts_with("mkdir -p -- "));
        assert!(cmd.command_line.contains("my dir"));
        assert_ne!(cmd.command_line, "mkdir -p -- /data/my dir");
    }

    #[test]
    fn test_parse_cwd() {
        assert_eq!(
            StateProbe::parse_cwd("/home/user\n"),
            Some("/home/user".to_string())
        );
        assert_eq!(
            StateProbe::parse_cwd("\n  /srv  \nextra"),
            Some("/srv".to_string())
        );
        assert!(StateProbe::parse_cwd("").is_none());
        assert!(StateProbe::parse_cwd("\n\n").is_none());
    }
}
