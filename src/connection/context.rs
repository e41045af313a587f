//! Per-connection working-directory context and execution bookkeeping.

/// Mutable context attached to a registered connection.
///
/// The working directory starts unknown. It is filled in lazily from the
/// remote side on the first query, or explicitly by the caller, and is never
/// re-validated once set.
#[derive(Debug, Clone, Default)]
pub struct ConnectionContext {
    /// Cached remote working directory.
    cwd: Option<String>,
    /// Last command executed.
    last_command: Option<String>,
    /// Exit code of last command.
    last_exit_code: Option<i32>,
    /// Command execution count.
    execution_count: u64,
}

impl ConnectionContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached working directory.
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Set the working directory.
    pub fn set_cwd(&mut self, cwd: impl Into<String>) {
        self.cwd = Some(cwd.into());
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Record a command execution result.
    pub fn record_execution(&mut self, command: impl Into<String>, exit_code: Option<i32>) {
        self.last_command = Some(command.into());
        self.last_exit_code = exit_code;
        self.execution_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        let ctx = ConnectionContext::new();
        assert!(ctx.cwd().is_none());
        assert!(ctx.last_command().is_none());
        assert!(ctx.last_exit_code().is_none());
        assert_eq!(ctx.execution_count(), 0);
    }

    #[test]
    fn test_context_set_cwd() {
        let mut ctx = ConnectionContext::new();
        ctx.set_cwd("/srv/app");
        assert_eq!(ctx.cwd(), Some("/srv/app"));
        ctx.set_cwd("/tmp");
        assert_eq!(ctx.cwd(), Some("/tmp"));
    }

    #[test]
    fn test_context_record_execution() {
        let mut ctx = ConnectionContext::new();

        ctx.record_execution("ls -la", Some(0));
        assert_eq!(ctx.last_command(), Some("ls -la"));
        assert_eq!(ctx.last_exit_code(), Some(0));
        assert_eq!(ctx.execution_count(), 1);

        ctx.record_execution("false", Some(1));
        assert_eq!(ctx.last_exit_code(), Some(1));
        assert_eq!(ctx.execution_count(), 2);
    }
}
