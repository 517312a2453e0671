//! Configuration for the Ticklist client
//!
//! The provider connection parameters are environment-injected in
//! deployments and overridable through the builder in tests.

use std::env;
use std::time::Duration;

/// Connection parameters for the identity provider and document store.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key sent with every request
    pub api_key: String,

    /// Domain hosting the identity and store endpoints
    pub auth_domain: String,

    /// Project identifier
    pub project_id: String,

    /// Storage bucket name
    pub storage_bucket: String,

    /// Messaging sender id
    pub messaging_sender_id: String,

    /// Application id
    pub app_id: String,

    /// Request timeout applied to the shared HTTP client
    pub request_timeout: Option<Duration>,

    identity_url: Option<String>,
    store_url: Option<String>,
}

impl Config {
    /// Create a configuration from the three required parameters.
    pub fn new(api_key: &str, auth_domain: &str, project_id: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            auth_domain: auth_domain.to_string(),
            project_id: project_id.to_string(),
            storage_bucket: String::new(),
            messaging_sender_id: String::new(),
            app_id: String::new(),
            request_timeout: Some(Duration::from_secs(30)),
            identity_url: None,
            store_url: None,
        }
    }

    /// Load the configuration from environment variables.
    ///
    /// Required: `TICKLIST_API_KEY`, `TICKLIST_AUTH_DOMAIN`,
    /// `TICKLIST_PROJECT_ID`.
    ///
    /// Optional: `TICKLIST_STORAGE_BUCKET`, `TICKLIST_MESSAGING_SENDER_ID`,
    /// `TICKLIST_APP_ID`, `TICKLIST_IDENTITY_URL`, `TICKLIST_STORE_URL`.
    ///
    /// # Panics
    ///
    /// Panics if a required variable is not set.
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("TICKLIST_API_KEY").expect("TICKLIST_API_KEY must be set"),
            auth_domain: env::var("TICKLIST_AUTH_DOMAIN")
                .expect("TICKLIST_AUTH_DOMAIN must be set"),
            project_id: env::var("TICKLIST_PROJECT_ID")
                .expect("TICKLIST_PROJECT_ID must be set"),
            storage_bucket: env::var("TICKLIST_STORAGE_BUCKET").unwrap_or_default(),
            messaging_sender_id: env::var("TICKLIST_MESSAGING_SENDER_ID").unwrap_or_default(),
            app_id: env::var("TICKLIST_APP_ID").unwrap_or_default(),
            request_timeout: Some(Duration::from_secs(30)),
            identity_url: env::var("TICKLIST_IDENTITY_URL").ok(),
            store_url: env::var("TICKLIST_STORE_URL").ok(),
        }
    }

    /// Set the storage bucket
    pub fn with_storage_bucket(mut self, value: &str) -> Self {
        self.storage_bucket = value.to_string();
        self
    }

    /// Set the messaging sender id
    pub fn with_messaging_sender_id(mut self, value: &str) -> Self {
        self.messaging_sender_id = value.to_string();
        self
    }

    /// Set the application id
    pub fn with_app_id(mut self, value: &str) -> Self {
        self.app_id = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Override the identity service base URL (used in tests)
    pub fn with_identity_url(mut self, value: &str) -> Self {
        self.identity_url = Some(value.to_string());
        self
    }

    /// Override the document-store base URL (used in tests)
    pub fn with_store_url(mut self, value: &str) -> Self {
        self.store_url = Some(value.to_string());
        self
    }

    /// Base URL for the identity service.
    pub fn identity_url(&self) -> String {
        match &self.identity_url {
            Some(url) => url.clone(),
            None => format!("https://{}", self.auth_domain),
        }
    }

    /// Base URL for the document store.
    pub fn store_url(&self) -> String {
        match &self.store_url {
            Some(url) => url.clone(),
            None => format!("https://{}", self.auth_domain),
        }
    }
}
