//! Shared session state
//!
//! Owned exclusively by the session manager; every other component reads
//! it, none mutates it directly.

use crate::error::Error;
use crate::models::User;

/// The error surfaced through shared state: a stable code plus a
/// user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub code: String,
    pub message: String,
}

impl SessionError {
    pub fn from_error(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.user_message(),
        }
    }
}

/// In-memory session state.
///
/// Three phases, driven solely by the identity provider's session
/// stream:
/// - uninitialized: `is_initialized == false`, `loading == true`,
///   no user; nothing has been heard from the provider yet;
/// - unauthenticated: initialized, settled, no user;
/// - authenticated: initialized, settled, mapped user present.
///
/// `error` is an orthogonal flag set by any failing operation and
/// cleared when the next operation begins.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<SessionError>,
    pub is_initialized: bool,
    pub is_anonymous: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
            error: None,
            is_initialized: false,
            is_anonymous: false,
        }
    }
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}
