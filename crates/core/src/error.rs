//! Gate error taxonomy.

use thiserror::Error;

/// Result type used across the gate.
pub type GateResult<T> = Result<T, GateError>;

/// Why the current session cannot be trusted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("no session token present")]
    MissingToken,

    #[error("session has expired")]
    Expired,

    /// The identity service refused the token (HTTP 401/403).
    #[error("identity service rejected the session (status {0})")]
    Rejected(u16),

    #[error("login failed: {0}")]
    InvalidCredentials(String),
}

/// Gate-level error.
///
/// The first two variants are terminal for an evaluation cycle: local session
/// state is cleared and the caller is sent to the login route. A policy
/// violation keeps the session and renders an in-place denial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("authentication failure: {0}")]
    AuthenticationFailure(AuthFailure),

    /// Network error, unexpected status, malformed body or timeout.
    #[error("permission fetch failed: {0}")]
    PermissionFetchFailure(String),

    #[error("access to '{route}' requires capability '{capability}'")]
    PolicyViolation { route: String, capability: String },
}

impl GateError {
    pub fn fetch_failure(msg: impl Into<String>) -> Self {
        Self::PermissionFetchFailure(msg.into())
    }

    pub fn policy_violation(route: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::PolicyViolation {
            route: route.into(),
            capability: capability.into(),
        }
    }

    /// Whether this error must end in a redirect to the login route.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailure(_) | Self::PermissionFetchFailure(_)
        )
    }
}

impl From<AuthFailure> for GateError {
    fn from(value: AuthFailure) -> Self {
        Self::AuthenticationFailure(value)
    }
}
