//! Route guard
//!
//! A pure policy over the shared session state: render, show a loading
//! placeholder, or redirect. While the state is still loading the guard
//! never redirects, so the first listener callback cannot cause a
//! redirect flicker.

use crate::session::AuthState;

/// What the caller should do with the requested route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Render the protected content.
    Render,
    /// Session state not settled yet; show a placeholder.
    Placeholder,
    /// Not signed in; go to sign-in, returning here afterwards.
    RedirectToSignIn { return_to: String },
    /// Signed in but the address is unverified and this route requires
    /// verification.
    RedirectToVerifyEmail,
}

/// Guard configuration for a protected route.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGuard {
    pub require_email_verification: bool,
}

impl RouteGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email_verification(mut self) -> Self {
        self.require_email_verification = true;
        self
    }

    /// Decide what to do with a request for `requested_path`.
    pub fn evaluate(&self, state: &AuthState, requested_path: &str) -> RouteDecision {
        if state.loading {
            return RouteDecision::Placeholder;
        }

        let user = match &state.user {
            Some(user) => user,
            None => {
                return RouteDecision::RedirectToSignIn {
                    return_to: requested_path.to_string(),
                }
            }
        };

        if self.require_email_verification && !user.email_verified {
            return RouteDecision::RedirectToVerifyEmail;
        }

        RouteDecision::Render
    }
}
