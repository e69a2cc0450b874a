use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Whether the supervisor currently owns a live watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Stopped,
    Running,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// Restart is Running → Stopped → Running; there is no direct self-transition,
/// so two sessions can never be live at once.
pub fn validate_transition(from: SupervisorState, to: SupervisorState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (SupervisorState::Stopped, SupervisorState::Running)
            | (SupervisorState::Running, SupervisorState::Stopped)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
