//! Shell session state machine.

use serde::Serialize;

/// Lifecycle state of an interactive shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellState {
    /// Registered, channel not yet open.
    #[default]
    Created,
    /// Channel open; accepts input.
    Active,
    /// Channel closed by the remote side. No new input, buffer still readable.
    Inactive,
    /// Closed by the caller and removed from the registry.
    Closed,
}

impl ShellState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Created -> Active
    /// - Created -> Closed
    /// - Active -> Inactive
    /// - Active -> Closed
    /// - Inactive -> Closed
    pub fn can_transition_to(&self, target: ShellState) -> bool {
        use ShellState::*;
        matches!(
            (*self, target),
            (Created, Active)
                | (Created, Closed)
                | (Active, Inactive)
                | (Active, Closed)
                | (Inactive, Closed)
        )
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: ShellState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::HubError::InvalidState(format!(
                "cannot move shell session from {:?} to {:?}",
                self, target
            )))
        }
    }

    /// Check if the session accepts input.
    pub fn accepts_input(&self) -> bool {
        matches!(self, ShellState::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = ShellState::Created;
        assert!(state.transition_to(ShellState::Active).is_ok());
        assert!(state.transition_to(ShellState::Inactive).is_ok());
        assert!(state.transition_to(ShellState::Closed).is_ok());
        assert_eq!(state, ShellState::Closed);
    }

    #[test]
    fn test_active_to_closed() {
        let mut state = ShellState::Active;
        assert!(state.transition_to(ShellState::Closed).is_ok());
    }

    #[test]
    fn test_inactive_cannot_reactivate() {
        let mut state = ShellState::Inactive;
        let err = state.transition_to(ShellState::Active).unwrap_err();
        assert!(matches!(err, crate::error::HubError::InvalidState(_)));
        assert_eq!(state, ShellState::Inactive);
    }

    #[test]
    fn test_invalid_from_closed() {
        let mut state = ShellState::Closed;
        assert!(state.transition_to(ShellState::Active).is_err());
        assert!(state.transition_to(ShellState::Inactive).is_err());
        assert!(state.transition_to(ShellState::Created).is_err());
    }

    #[test]
    fn test_flags() {
        assert!(ShellState::Active.accepts_input());
        assert!(!ShellState::Inactive.accepts_input());
        assert!(!ShellState::Created.accepts_input());
        assert!(!ShellState::Closed.accepts_input());
    }

    #[test]
    fn test_default() {
        assert_eq!(ShellState::default(), ShellState::Created);
    }
}
