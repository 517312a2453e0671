//! Ticklist client core
//!
//! The client library behind the Ticklist collaborative checklist
//! application: an identity-provider client, a document-store client,
//! record services for users and checklists, a process-wide session
//! manager reconciling provider session events into shared state, and a
//! route guard policy over that state.

pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod models;
pub mod services;
pub mod session;
pub mod store;

use reqwest::Client;
use std::sync::Arc;

use crate::config::Config;
use crate::identity::IdentityClient;
use crate::services::checklists::ChecklistService;
use crate::services::users::UserService;
use crate::session::SessionManager;
use crate::store::DocumentStore;

/// The main entry point for the Ticklist client
pub struct Ticklist {
    /// Client configuration
    pub config: Config,
    /// HTTP client shared by all sub-clients
    pub http_client: Client,
    /// Identity provider client
    identity: Arc<IdentityClient>,
    /// Document store client
    store: DocumentStore,
}

impl Ticklist {
    /// Create a new Ticklist client from a configuration.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ticklist::{config::Config, Ticklist};
    ///
    /// let config = Config::new("anon-key", "app.ticklist.dev", "ticklist-prod");
    /// let client = Ticklist::new(config);
    /// ```
    pub fn new(config: Config) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .expect("HTTP client configuration is invalid");

        let identity = Arc::new(IdentityClient::new(
            &config.identity_url(),
            &config.api_key,
            http_client.clone(),
        ));
        let store = DocumentStore::new(&config.store_url(), &config.api_key, http_client.clone());

        Self {
            config,
            http_client,
            identity,
            store,
        }
    }

    /// The identity provider client.
    pub fn identity(&self) -> Arc<IdentityClient> {
        self.identity.clone()
    }

    /// The document store client.
    pub fn store(&self) -> DocumentStore {
        self.store.clone()
    }

    /// The user record service.
    pub fn users(&self) -> UserService {
        UserService::new(self.store.clone())
    }

    /// The checklist record service, scoped to the active session.
    pub fn checklists(&self) -> ChecklistService {
        ChecklistService::new(self.store.clone(), self.identity.clone())
    }

    /// Build the process-wide session manager. Call
    /// [`SessionManager::start`] once on application init.
    pub fn session_manager(&self, user_agent: &str) -> SessionManager {
        SessionManager::new(self.identity.clone(), self.users()).with_user_agent(user_agent)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::Error;
    pub use crate::guard::{RouteDecision, RouteGuard};
    pub use crate::session::{AuthState, SessionManager};
    pub use crate::Ticklist;
}
