use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the automation session in the login/loading/ready sequence.
///
/// The automation loop is the sole writer of the current state. Transitions
/// are monotonic except `LoggedIn -> LoggedOut` (session loss) and
/// `* -> Unknown` (transient detection ambiguity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Unknown,
    AuthRequired,
    QrAuth,
    Loading,
    LoggedIn,
    LoggedOut,
}

impl LifecycleState {
    /// True for the auth-entry states shown before a session exists.
    pub fn is_auth_stage(&self) -> bool {
        matches!(self, LifecycleState::AuthRequired | LifecycleState::QrAuth)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unknown => "unknown",
            LifecycleState::AuthRequired => "auth_required",
            LifecycleState::QrAuth => "qr_auth",
            LifecycleState::Loading => "loading",
            LifecycleState::LoggedIn => "logged_in",
            LifecycleState::LoggedOut => "logged_out",
        };
        f.write_str(name)
    }
}
