//! Wire types for the identity provider

use serde::{Deserialize, Serialize};

/// A user as the identity provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUser {
    /// Subject identifier; the application user id.
    pub local_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default)]
    pub is_anonymous: bool,
}

/// An active provider session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSession {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: ProviderUser,
}

/// Social sign-in providers supported by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Apple,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google.com",
            Self::Apple => "apple.com",
        }
    }
}

/// A credential obtained from a social provider, ready for exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredential {
    pub provider: OAuthProvider,
    pub id_token: String,
}

impl OAuthCredential {
    pub fn google(id_token: &str) -> Self {
        Self {
            provider: OAuthProvider::Google,
            id_token: id_token.to_string(),
        }
    }

    pub fn apple(id_token: &str) -> Self {
        Self {
            provider: OAuthProvider::Apple,
            id_token: id_token.to_string(),
        }
    }
}

/// Error body returned by the identity service on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}
