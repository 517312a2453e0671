//! Error handling for the Ticklist client
//!
//! Failures are split into closed categories so callers can match
//! exhaustively instead of probing error objects for an optional code:
//! provider auth errors (coded), data-store errors (per operation),
//! and capability errors synthesized before any network call.

use std::fmt;
use thiserror::Error;

/// Unified error type for the Ticklist client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Raw document-store transport failure. The record services catch
    /// this and re-raise a [`DataStoreError`]; it does not cross the
    /// service boundary.
    #[error("store error (status {status}): {message}")]
    Store { status: u16, message: String },

    /// Coded errors reported by the identity provider
    #[error(transparent)]
    Provider(#[from] ProviderAuthError),

    /// Errors raised at the document-store service boundary
    #[error(transparent)]
    DataStore(#[from] DataStoreError),

    /// Client-side capability errors, raised before any network call
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// An operation that requires an active session was called without one
    #[error("no active session")]
    MissingSession,

    /// The current session has no email address to re-authenticate with
    #[error("current session has no email address")]
    MissingEmail,
}

impl Error {
    /// Stable error code string, used for the shared session error state.
    pub fn code(&self) -> String {
        match self {
            Error::Http(_) => "network-error".to_string(),
            Error::Json(_) => "serialization-error".to_string(),
            Error::Url(_) => "invalid-url".to_string(),
            Error::Store { .. } => "store-error".to_string(),
            Error::Provider(e) => e.code.as_str().to_string(),
            Error::DataStore(e) => e.kind.code().to_string(),
            Error::Capability(e) => e.code().to_string(),
            Error::MissingSession => "missing-session".to_string(),
            Error::MissingEmail => "missing-email".to_string(),
        }
    }

    /// Message suitable for direct display in a form or banner.
    pub fn user_message(&self) -> String {
        match self {
            Error::Provider(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Known identity-provider error codes, plus a fallback for
/// anything the fixed set does not cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserDisabled,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    RequiresRecentLogin,
    OperationNotAllowed,
    Other(String),
}

impl AuthErrorCode {
    /// Parse a provider wire code into the closed set.
    pub fn parse(code: &str) -> Self {
        match code {
            "email-already-in-use" => Self::EmailAlreadyInUse,
            "invalid-email" => Self::InvalidEmail,
            "weak-password" => Self::WeakPassword,
            "user-disabled" => Self::UserDisabled,
            "user-not-found" => Self::UserNotFound,
            "wrong-password" => Self::WrongPassword,
            "too-many-requests" => Self::TooManyRequests,
            "requires-recent-login" => Self::RequiresRecentLogin,
            "operation-not-allowed" => Self::OperationNotAllowed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EmailAlreadyInUse => "email-already-in-use",
            Self::InvalidEmail => "invalid-email",
            Self::WeakPassword => "weak-password",
            Self::UserDisabled => "user-disabled",
            Self::UserNotFound => "user-not-found",
            Self::WrongPassword => "wrong-password",
            Self::TooManyRequests => "too-many-requests",
            Self::RequiresRecentLogin => "requires-recent-login",
            Self::OperationNotAllowed => "operation-not-allowed",
            Self::Other(code) => code,
        }
    }

    /// Fixed translation table of known codes to user-facing strings.
    /// Unrecognized codes return `None` and fall back to the provider's
    /// raw message.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::EmailAlreadyInUse => {
                Some("An account with this email address already exists.")
            }
            Self::InvalidEmail => Some("The email address is not valid."),
            Self::WeakPassword => {
                Some("The password is too weak. Use at least 6 characters.")
            }
            Self::UserDisabled => Some("This account has been disabled."),
            Self::UserNotFound => Some("No account found with this email address."),
            Self::WrongPassword => Some("Incorrect password."),
            Self::TooManyRequests => Some("Too many attempts. Please try again later."),
            Self::RequiresRecentLogin => {
                Some("Please sign in again before retrying this operation.")
            }
            Self::OperationNotAllowed => Some("This sign-in method is not enabled."),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by the identity provider, carrying the provider's
/// code and raw message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("provider error ({code}): {message}")]
pub struct ProviderAuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl ProviderAuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The mapped user-facing string for known codes, or the provider's
    /// raw message otherwise.
    pub fn user_message(&self) -> String {
        match self.code.user_message() {
            Some(mapped) => mapped.to_string(),
            None => self.message.clone(),
        }
    }
}

/// Failure category at the data-store service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStoreErrorKind {
    /// Generic transport or server failure; detail is deliberately
    /// discarded at the service boundary.
    Failed,
    /// The store rejected the request for the current caller.
    PermissionDenied,
    /// No signed-in session to scope the request to.
    Unauthenticated,
}

impl DataStoreErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failed => "operation-failed",
            Self::PermissionDenied => "permission-denied",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

/// An error raised by one of the record services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct DataStoreError {
    pub operation: &'static str,
    pub kind: DataStoreErrorKind,
}

impl DataStoreError {
    pub fn failed(operation: &'static str) -> Self {
        Self {
            operation,
            kind: DataStoreErrorKind::Failed,
        }
    }

    pub fn permission_denied(operation: &'static str) -> Self {
        Self {
            operation,
            kind: DataStoreErrorKind::PermissionDenied,
        }
    }

    pub fn unauthenticated(operation: &'static str) -> Self {
        Self {
            operation,
            kind: DataStoreErrorKind::Unauthenticated,
        }
    }
}

impl fmt::Display for DataStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DataStoreErrorKind::Failed => write!(f, "{}: operation failed", self.operation),
            DataStoreErrorKind::PermissionDenied => {
                write!(f, "{}: you do not have permission for this data", self.operation)
            }
            DataStoreErrorKind::Unauthenticated => {
                write!(f, "{}: you must be signed in", self.operation)
            }
        }
    }
}

/// Capability errors synthesized locally, before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Apple sign-in is only available on iOS devices and Safari")]
    UnsupportedBrowser { user_agent: String },
}

impl CapabilityError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedBrowser { .. } => "unsupported-browser",
        }
    }
}
