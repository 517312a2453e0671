//! Auth reconciliation layer
//!
//! `SessionManager` bridges the identity provider's event-driven session
//! to the rest of the application. A single long-lived listener task is
//! the only writer of `user`/`is_initialized`; operations are requests
//! to the provider that set `loading`/`error` optimistically around
//! their own call and otherwise wait for the listener to observe the
//! resulting change.

mod state;

use chrono::Utc;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{CapabilityError, Error};
use crate::identity::{IdentityClient, OAuthCredential, ProviderUser};
use crate::models::UserRole;
use crate::services::users::{CreateUserInput, UserPatch, UserService};

pub use state::{AuthState, SessionError};

/// Apple sign-in is only offered where the platform can complete it:
/// iOS devices, or desktop Safari. Chrome-family and Android browsers
/// embed "Safari" in their user agents, so they must be excluded
/// explicitly.
pub fn supports_apple_sign_in(user_agent: &str) -> bool {
    let is_ios = user_agent.contains("iPhone")
        || user_agent.contains("iPad")
        || user_agent.contains("iPod");
    let is_safari = user_agent.contains("Safari")
        && !user_agent.contains("Chrome")
        && !user_agent.contains("Chromium")
        && !user_agent.contains("CriOS")
        && !user_agent.contains("Edg")
        && !user_agent.contains("Android");
    is_ios || is_safari
}

/// Process-wide session manager.
///
/// Lifecycle: construct once, call [`start`](Self::start) on application
/// init, [`stop`](Self::stop) on shutdown.
pub struct SessionManager {
    identity: Arc<IdentityClient>,
    users: UserService,
    user_agent: String,
    state: Arc<watch::Sender<AuthState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(identity: Arc<IdentityClient>, users: UserService) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            identity,
            users,
            user_agent: String::new(),
            state: Arc::new(state),
            listener: Mutex::new(None),
        }
    }

    /// Set the client user agent used for capability checks.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Snapshot of the current state (polling accessor).
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Start the listener task consuming the provider's session stream.
    /// Idempotent: a second call is a no-op while the task is running.
    pub fn start(&self) {
        let mut guard = self.listener.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let mut changes = self.identity.on_session_change();
        let users = self.users.clone();
        let state = self.state.clone();

        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => reconcile(&users, &state, change).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("session listener lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *guard = Some(handle);
    }

    /// Tear the listener down.
    pub fn stop(&self) {
        if let Some(handle) = self.listener.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Create a provider credential, then create the backing user
    /// record. If record creation fails the provider account is NOT
    /// rolled back; the orphan is logged and the error surfaced.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), Error> {
        self.begin();
        let result = async {
            let session = self.identity.sign_up(email, password).await?;
            let user = session.user;
            self.users
                .create_user(CreateUserInput {
                    id: user.local_id.clone(),
                    email: user.email.unwrap_or_else(|| email.to_string()),
                    display_name: display_name_for(&user.display_name, email),
                    photo_url: user.photo_url,
                    email_verified: user.email_verified,
                    is_anonymous: false,
                    role: UserRole::User,
                    password: None,
                })
                .await
                .map_err(|err| {
                    warn!(
                        "sign-up record creation failed, provider account {} has no record: {}",
                        user.local_id, err
                    );
                    err
                })?;
            Ok(())
        }
        .await;
        self.settle(result)
    }

    /// Sign in with email and password. Provider errors pass through
    /// unmodified.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), Error> {
        self.begin();
        let result = async {
            self.identity.sign_in_with_password(email, password).await?;
            Ok(())
        }
        .await;
        self.settle(result)
    }

    /// Sign in with a Google credential.
    pub async fn sign_in_with_google(&self, id_token: &str) -> Result<(), Error> {
        self.social_sign_in(OAuthCredential::google(id_token)).await
    }

    /// Sign in with an Apple credential. Fails fast with a capability
    /// error on unsupported browsers, before any network call.
    pub async fn sign_in_with_apple(&self, id_token: &str) -> Result<(), Error> {
        self.begin();
        if let Err(err) = self.check_apple_support() {
            return self.settle(Err(err));
        }
        let result = self
            .social_exchange(OAuthCredential::apple(id_token))
            .await;
        self.settle(result)
    }

    /// Sign in anonymously. The listener guarantees a guest record
    /// exists for the anonymous id once the session settles.
    pub async fn sign_in_anonymously(&self) -> Result<(), Error> {
        self.begin();
        let result = async {
            self.identity.sign_in_anonymously().await?;
            Ok(())
        }
        .await;
        self.settle(result)
    }

    /// Sign out. `is_anonymous` is cleared optimistically; the listener
    /// remains authoritative and reconciles on its next event.
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.begin();
        self.state.send_modify(|s| s.is_anonymous = false);
        let result = self.identity.sign_out().await;
        self.settle(result)
    }

    /// Send a password-reset email.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), Error> {
        self.begin();
        let result = self.identity.send_password_reset(email).await;
        self.settle(result)
    }

    /// Send a verification email for the current session's address.
    /// Fails when no session is active.
    pub async fn send_email_verification(&self) -> Result<(), Error> {
        self.begin();
        let result = self.identity.send_email_verification().await;
        self.settle(result)
    }

    /// Change the account email. Re-authenticates with a credential
    /// rebuilt from the current session email and the supplied password
    /// before mutating, then mirrors the change onto the user record.
    pub async fn update_email(&self, new_email: &str, password: &str) -> Result<(), Error> {
        self.begin();
        let result = async {
            self.identity.reauthenticate(password).await?;
            let user = self.identity.update_email(new_email).await?;
            self.users
                .update_user(
                    &user.local_id,
                    UserPatch {
                        email: Some(new_email.to_string()),
                        email_verified: Some(user.email_verified),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(())
        }
        .await;
        self.settle(result)
    }

    /// Change the account password, re-authenticating first.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        self.begin();
        let result = async {
            self.identity.reauthenticate(current_password).await?;
            self.identity.update_password(new_password).await?;
            Ok(())
        }
        .await;
        self.settle(result)
    }

    /// Delete the account: re-authenticate, delete the backing record
    /// (best-effort; a data-layer failure must not block deletion),
    /// then delete the provider account.
    pub async fn delete_account(&self, password: &str) -> Result<(), Error> {
        self.begin();
        let result = async {
            self.identity.reauthenticate(password).await?;
            let uid = self.identity.current_uid().ok_or(Error::MissingSession)?;

            if let Err(err) = self.users.delete_user(&uid).await {
                warn!("deleting record for {} failed, continuing: {}", uid, err);
            }

            self.identity.delete_account().await?;
            Ok(())
        }
        .await;
        self.settle(result)
    }

    /// Attach an email/password credential to the current (anonymous)
    /// session and promote its record from guest to user.
    pub async fn link_with_email(&self, email: &str, password: &str) -> Result<(), Error> {
        self.begin();
        let result = async {
            let user = self.identity.link_with_email(email, password).await?;
            self.promote_linked_record(&user).await
        }
        .await;
        self.settle(result)
    }

    /// Attach a Google credential to the current session.
    pub async fn link_with_google(&self, id_token: &str) -> Result<(), Error> {
        self.begin();
        let result = async {
            let session = self
                .identity
                .link_with_oauth(&OAuthCredential::google(id_token))
                .await?;
            self.promote_linked_record(&session.user).await
        }
        .await;
        self.settle(result)
    }

    /// Attach an Apple credential to the current session. Carries the
    /// same capability gate as Apple sign-in.
    pub async fn link_with_apple(&self, id_token: &str) -> Result<(), Error> {
        self.begin();
        if let Err(err) = self.check_apple_support() {
            return self.settle(Err(err));
        }
        let result = async {
            let session = self
                .identity
                .link_with_oauth(&OAuthCredential::apple(id_token))
                .await?;
            self.promote_linked_record(&session.user).await
        }
        .await;
        self.settle(result)
    }

    async fn social_sign_in(&self, credential: OAuthCredential) -> Result<(), Error> {
        self.begin();
        let result = self.social_exchange(credential).await;
        self.settle(result)
    }

    /// Exchange the credential, then provision a record on first
    /// sign-in or patch `displayName`/`photoURL` when the provider's
    /// values differ from the stored ones, touching `lastLogin`.
    async fn social_exchange(&self, credential: OAuthCredential) -> Result<(), Error> {
        let session = self.identity.sign_in_with_oauth(&credential).await?;
        let user = &session.user;

        match self.users.get_user(&user.local_id).await? {
            None => {
                self.users
                    .create_user(CreateUserInput {
                        id: user.local_id.clone(),
                        email: user.email.clone().unwrap_or_default(),
                        display_name: display_name_for(
                            &user.display_name,
                            user.email.as_deref().unwrap_or_default(),
                        ),
                        photo_url: user.photo_url.clone(),
                        email_verified: user.email_verified,
                        is_anonymous: false,
                        role: UserRole::User,
                        password: None,
                    })
                    .await?;
            }
            Some(existing) => {
                let mut patch = UserPatch {
                    last_login: Some(Utc::now()),
                    ..Default::default()
                };
                if let Some(display_name) = &user.display_name {
                    if *display_name != existing.display_name {
                        patch.display_name = Some(display_name.clone());
                    }
                }
                if let Some(photo_url) = &user.photo_url {
                    if existing.photo_url.as_deref() != Some(photo_url) {
                        patch.photo_url = Some(photo_url.clone());
                    }
                }
                self.users.update_user(&user.local_id, patch).await?;
            }
        }
        Ok(())
    }

    /// After linking, the record stops being a guest.
    async fn promote_linked_record(&self, user: &ProviderUser) -> Result<(), Error> {
        self.users
            .update_user(
                &user.local_id,
                UserPatch {
                    email: user.email.clone(),
                    is_anonymous: Some(false),
                    role: Some(UserRole::User),
                    ..Default::default()
                },
            )
            .await
    }

    fn check_apple_support(&self) -> Result<(), Error> {
        if supports_apple_sign_in(&self.user_agent) {
            Ok(())
        } else {
            Err(CapabilityError::UnsupportedBrowser {
                user_agent: self.user_agent.clone(),
            }
            .into())
        }
    }

    /// Clear the previous error and mark the operation in flight.
    fn begin(&self) {
        self.state.send_modify(|s| {
            s.error = None;
            s.loading = true;
        });
    }

    /// Record the outcome into shared state and propagate it, so both
    /// centralized and local error handling stay possible.
    fn settle<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        match &result {
            Ok(_) => self.state.send_modify(|s| s.loading = false),
            Err(err) => {
                let session_err = SessionError::from_error(err);
                self.state.send_modify(move |s| {
                    s.loading = false;
                    s.error = Some(session_err);
                });
            }
        }
        result
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply one provider event to the shared state. The sole writer of
/// `user` and `is_initialized`.
async fn reconcile(
    users: &UserService,
    state: &watch::Sender<AuthState>,
    change: Option<ProviderUser>,
) {
    match change {
        None => {
            debug!("session ended");
            state.send_modify(|s| {
                s.user = None;
                s.is_anonymous = false;
                s.loading = false;
                s.is_initialized = true;
            });
        }
        Some(provider_user) => {
            match lookup_or_provision(users, &provider_user).await {
                Ok(record) => {
                    state.send_modify(move |s| {
                        s.user = Some(record);
                        s.is_anonymous = provider_user.is_anonymous;
                        s.loading = false;
                        s.is_initialized = true;
                    });
                }
                Err(err) => {
                    warn!("mapping session {} failed: {}", provider_user.local_id, err);
                    let session_err = SessionError::from_error(&err);
                    state.send_modify(move |s| {
                        s.error = Some(session_err);
                        s.loading = false;
                        s.is_initialized = true;
                    });
                }
            }
        }
    }
}

/// Fetch the backing record, provisioning one the first time a session
/// is observed. Anonymous sessions get a guest record with a random
/// placeholder password for schema compatibility.
async fn lookup_or_provision(
    users: &UserService,
    provider_user: &ProviderUser,
) -> Result<crate::models::User, Error> {
    if let Some(existing) = users.get_user(&provider_user.local_id).await? {
        return Ok(existing);
    }

    debug!("provisioning record for {}", provider_user.local_id);
    let input = if provider_user.is_anonymous {
        CreateUserInput {
            id: provider_user.local_id.clone(),
            email: String::new(),
            display_name: "Guest".to_string(),
            photo_url: None,
            email_verified: false,
            is_anonymous: true,
            role: UserRole::Guest,
            password: Some(Uuid::new_v4().to_string()),
        }
    } else {
        CreateUserInput {
            id: provider_user.local_id.clone(),
            email: provider_user.email.clone().unwrap_or_default(),
            display_name: display_name_for(
                &provider_user.display_name,
                provider_user.email.as_deref().unwrap_or_default(),
            ),
            photo_url: provider_user.photo_url.clone(),
            email_verified: provider_user.email_verified,
            is_anonymous: false,
            role: UserRole::User,
            password: None,
        }
    };
    users.create_user(input).await
}

/// Provider display name when present, else the email's local part.
fn display_name_for(display_name: &Option<String>, email: &str) -> String {
    match display_name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => email.split('@').next().unwrap_or_default().to_string(),
    }
}
