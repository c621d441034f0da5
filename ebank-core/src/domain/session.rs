//! Session lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle of one client session
///
/// ```text
/// Disconnected -> Authenticating -> Authenticated -> Closed
///       ^               |
///       +---------------+  (login false or remote failure)
/// ```
///
/// `Closed` is the terminal disconnected state reached after an
/// authenticated session ends. It never transitions again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Disconnected,
    Authenticating,
    Authenticated,
    Closed,
}

impl SessionState {
    /// Balance queries, money movements and transfer receipts
    pub fn permits_transactions(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// Whether a login attempt may start from this state
    pub fn can_begin_login(&self) -> bool {
        matches!(self, SessionState::Disconnected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}
