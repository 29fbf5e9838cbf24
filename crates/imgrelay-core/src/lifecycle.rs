use crate::CoreError;
use serde::{Deserialize, Serialize};

/// Progress of one (repository, destination region, tag) triple within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagState {
    Pending,
    Skipped,
    Transferring,
    Pushed,
    /// Tagged for the destination locally; the push was skipped on request.
    Tagged,
    Failed,
}

impl std::fmt::Display for TagState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagState::Pending => write!(f, "pending"),
            TagState::Skipped => write!(f, "skipped"),
            TagState::Transferring => write!(f, "transferring"),
            TagState::Pushed => write!(f, "pushed"),
            TagState::Tagged => write!(f, "tagged"),
            TagState::Failed => write!(f, "failed"),
        }
    }
}

impl TagState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TagState::Skipped | TagState::Pushed | TagState::Tagged | TagState::Failed
        )
    }

    /// Move to `to` if the transition is allowed.
    pub fn advance(&mut self, to: TagState) -> Result<(), CoreError> {
        validate_transition(*self, to)?;
        *self = to;
        Ok(())
    }
}

pub fn validate_transition(from: TagState, to: TagState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (TagState::Pending, TagState::Skipped | TagState::Transferring)
            | (
                TagState::Transferring,
                TagState::Pushed | TagState::Tagged | TagState::Failed
            )
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
