use serde::{Deserialize, Serialize};

/// Lifecycle tag of one render session. Running is only reachable from Idle,
/// and the three terminal states only lead back to Idle through a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Running,
    Cancelling,
    Completed,
    Canceled,
    /// Launch failure or non-zero exit; carries the exit code when one was
    /// observed (a killed process has none).
    Failed { exit_code: Option<i32> },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Canceled | SessionState::Failed { .. }
        )
    }
}
