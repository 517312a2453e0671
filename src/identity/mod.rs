//! Identity provider client
//!
//! A REST client for the identity service. It owns the current provider
//! session and publishes every session change on a broadcast channel;
//! that stream is the sole authoritative input to the session manager.

mod types;

use log::warn;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::error::{AuthErrorCode, Error, ProviderAuthError};

pub use types::*;

/// Client for the identity provider's REST surface.
pub struct IdentityClient {
    url: String,
    api_key: String,
    http_client: Client,
    current_session: Arc<RwLock<Option<ProviderSession>>>,
    session_change: broadcast::Sender<Option<ProviderUser>>,
}

impl IdentityClient {
    /// Create a new identity client.
    pub fn new(url: &str, api_key: &str, http_client: Client) -> Self {
        let (session_change, _) = broadcast::channel(16);
        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
            http_client,
            current_session: Arc::new(RwLock::new(None)),
            session_change,
        }
    }

    fn account_url(&self, action: &str) -> String {
        format!("{}/identity/v1/accounts:{}", self.url, action)
    }

    /// Subscribe to session changes. The receiver observes
    /// `Some(user)` after every sign-in/link/profile mutation and `None`
    /// after sign-out or account deletion.
    pub fn on_session_change(&self) -> broadcast::Receiver<Option<ProviderUser>> {
        self.session_change.subscribe()
    }

    /// The current session, if any.
    pub fn get_session(&self) -> Option<ProviderSession> {
        self.current_session.read().unwrap().clone()
    }

    /// The current session's subject id, if any.
    pub fn current_uid(&self) -> Option<String> {
        self.current_session
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.user.local_id.clone())
    }

    /// Replace the stored session and publish the change.
    pub fn set_session(&self, session: Option<ProviderSession>) {
        let user = session.as_ref().map(|s| s.user.clone());
        {
            let mut current = self.current_session.write().unwrap();
            *current = session;
        }
        // A send error only means no subscriber is listening yet.
        let _ = self.session_change.send(user);
    }

    fn session_token(&self) -> Result<String, Error> {
        self.current_session
            .read()
            .unwrap()
            .as_ref()
            .map(|s| s.id_token.clone())
            .ok_or(Error::MissingSession)
    }

    fn session_email(&self) -> Result<String, Error> {
        let session = self.get_session().ok_or(Error::MissingSession)?;
        session.user.email.ok_or(Error::MissingEmail)
    }

    /// POST to an account action and parse the response, translating
    /// non-2xx bodies into coded provider errors.
    async fn post_account<T: DeserializeOwned>(
        &self,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<T, Error> {
        let response = self
            .http_client
            .post(self.account_url(action))
            .header("apikey", &self.api_key)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_provider_error(&text, status.as_u16()).into());
        }

        Ok(response.json::<T>().await?)
    }

    /// Register a new account with email and password.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderSession, Error> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let session: ProviderSession = self.post_account("signUp", &payload).await?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Sign in with email and password.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, Error> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        let session: ProviderSession = self.post_account("signInWithPassword", &payload).await?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Sign in anonymously. The provider mints a subject id with no
    /// credential attached.
    pub async fn sign_in_anonymously(&self) -> Result<ProviderSession, Error> {
        let payload = serde_json::json!({});
        let session: ProviderSession = self.post_account("signUp", &payload).await?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Exchange a social credential for a session.
    pub async fn sign_in_with_oauth(
        &self,
        credential: &OAuthCredential,
    ) -> Result<ProviderSession, Error> {
        let payload = serde_json::json!({
            "providerId": credential.provider.as_str(),
            "idToken": credential.id_token,
        });
        let session: ProviderSession = self.post_account("signInWithIdp", &payload).await?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Attach a social credential to the current (typically anonymous)
    /// session, making it permanently recoverable.
    pub async fn link_with_oauth(
        &self,
        credential: &OAuthCredential,
    ) -> Result<ProviderSession, Error> {
        let token = self.session_token()?;
        let payload = serde_json::json!({
            "providerId": credential.provider.as_str(),
            "idToken": credential.id_token,
            "sessionToken": token,
        });
        let session: ProviderSession = self.post_account("signInWithIdp", &payload).await?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Attach an email/password credential to the current session.
    pub async fn link_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, Error> {
        let token = self.session_token()?;
        let payload = serde_json::json!({
            "idToken": token,
            "email": email,
            "password": password,
        });
        let user: ProviderUser = self.post_account("update", &payload).await?;
        self.replace_session_user(user.clone());
        Ok(user)
    }

    /// Re-present the current account's password to the provider.
    /// Required immediately before security-sensitive mutations.
    pub async fn reauthenticate(&self, password: &str) -> Result<ProviderSession, Error> {
        let email = self.session_email()?;
        self.sign_in_with_password(&email, password).await
    }

    /// Change the account email. Caller must have re-authenticated.
    pub async fn update_email(&self, new_email: &str) -> Result<ProviderUser, Error> {
        let token = self.session_token()?;
        let payload = serde_json::json!({
            "idToken": token,
            "email": new_email,
        });
        let user: ProviderUser = self.post_account("update", &payload).await?;
        self.replace_session_user(user.clone());
        Ok(user)
    }

    /// Change the account password. Caller must have re-authenticated.
    pub async fn update_password(&self, new_password: &str) -> Result<ProviderUser, Error> {
        let token = self.session_token()?;
        let payload = serde_json::json!({
            "idToken": token,
            "password": new_password,
        });
        let user: ProviderUser = self.post_account("update", &payload).await?;
        self.replace_session_user(user.clone());
        Ok(user)
    }

    /// Send a password-reset email.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), Error> {
        let payload = serde_json::json!({
            "requestType": "PASSWORD_RESET",
            "email": email,
        });
        let _: serde_json::Value = self.post_account("sendOobCode", &payload).await?;
        Ok(())
    }

    /// Send a verification email for the current session's address.
    pub async fn send_email_verification(&self) -> Result<(), Error> {
        let token = self.session_token()?;
        let payload = serde_json::json!({
            "requestType": "VERIFY_EMAIL",
            "idToken": token,
        });
        let _: serde_json::Value = self.post_account("sendOobCode", &payload).await?;
        Ok(())
    }

    /// Delete the provider account backing the current session.
    pub async fn delete_account(&self) -> Result<(), Error> {
        let token = self.session_token()?;
        let payload = serde_json::json!({ "idToken": token });
        let _: serde_json::Value = self.post_account("delete", &payload).await?;
        self.set_session(None);
        Ok(())
    }

    /// Revoke the current session server-side and clear it locally.
    pub async fn sign_out(&self) -> Result<(), Error> {
        let token = self.session_token()?;
        let payload = serde_json::json!({ "idToken": token });
        let _: serde_json::Value = self.post_account("signOut", &payload).await?;
        self.set_session(None);
        Ok(())
    }

    /// Exchange the refresh token for a fresh session.
    pub async fn refresh_session(&self) -> Result<ProviderSession, Error> {
        let refresh_token = self
            .get_session()
            .map(|s| s.refresh_token)
            .ok_or(Error::MissingSession)?;

        let url = format!("{}/identity/v1/token", self.url);
        let payload = serde_json::json!({
            "grantType": "refresh_token",
            "refreshToken": refresh_token,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_provider_error(&text, status.as_u16()).into());
        }

        let session: ProviderSession = response.json().await?;
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Build the browser authorize URL for a social provider.
    pub fn authorize_url(&self, provider: OAuthProvider, redirect_to: Option<&str>) -> String {
        let mut url = format!(
            "{}/identity/v1/authorize?provider={}&apiKey={}",
            self.url,
            provider.as_str(),
            urlencoding::encode(&self.api_key)
        );
        if let Some(redirect_to) = redirect_to {
            url.push_str(&format!(
                "&redirectTo={}",
                urlencoding::encode(redirect_to)
            ));
        }
        url
    }

    /// Update the user on the stored session after a profile mutation
    /// and publish the change.
    fn replace_session_user(&self, user: ProviderUser) {
        let updated = {
            let mut current = self.current_session.write().unwrap();
            match current.as_mut() {
                Some(session) => {
                    session.user = user.clone();
                    true
                }
                None => false,
            }
        };
        if updated {
            let _ = self.session_change.send(Some(user));
        } else {
            warn!("session disappeared while applying a profile mutation");
        }
    }
}

/// Parse a provider error body into a coded error. Bodies that do not
/// match the documented shape fall back to the raw text.
fn parse_provider_error(body: &str, status: u16) -> ProviderAuthError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => ProviderAuthError::new(
            AuthErrorCode::parse(&parsed.error.code),
            parsed.error.message,
        ),
        Err(_) => ProviderAuthError::new(
            AuthErrorCode::Other(format!("http-{}", status)),
            body.to_string(),
        ),
    }
}
