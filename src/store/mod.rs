//! Document store client
//!
//! Path-addressed JSON documents (`{collection}/{id}`) with point
//! reads/writes/merge-updates/deletes and ordered collection queries.
//! No transactions are used by this layer.

mod query;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Error;

pub use query::{Query, SortOrder};

/// Client for the document store's REST surface.
#[derive(Clone)]
pub struct DocumentStore {
    base_url: String,
    api_key: String,
    http_client: Client,
    auth_token: Option<String>,
}

impl DocumentStore {
    /// Create a new store client.
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            http_client,
            auth_token: None,
        }
    }

    /// Attach the caller's bearer token to subsequent requests.
    pub fn with_auth(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// Reference a collection by name.
    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef {
            store: self.clone(),
            url: format!("{}/store/v1/{}", self.base_url, name),
        }
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, Error> {
        let mut request = self
            .http_client
            .request(method, url)
            .header("apikey", &self.api_key);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .json(body);
        }
        Ok(request.send().await?)
    }
}

/// Response returned by the store when it generates a document id.
#[derive(Debug, serde::Deserialize)]
struct CreatedDocument {
    id: String,
}

/// A reference to one collection.
pub struct CollectionRef {
    store: DocumentStore,
    url: String,
}

impl CollectionRef {
    /// Reference a document by id.
    pub fn doc(&self, id: &str) -> DocumentRef {
        DocumentRef {
            store: self.store.clone(),
            url: format!("{}/{}", self.url, id),
        }
    }

    /// Add a document, letting the store generate its id.
    pub async fn add<T: Serialize>(&self, document: &T) -> Result<String, Error> {
        let body = serde_json::to_value(document)?;
        let response = self
            .store
            .request(Method::POST, &self.url, Some(&body))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Store {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreatedDocument = response.json().await?;
        Ok(created.id)
    }

    /// Start a query over this collection.
    pub fn query(&self) -> Query {
        Query {
            url: self.url.clone(),
            api_key: self.store.api_key.clone(),
            auth_token: self.store.auth_token.clone(),
            http_client: self.store.http_client.clone(),
            params: HashMap::new(),
        }
    }
}

/// A reference to one document.
pub struct DocumentRef {
    store: DocumentStore,
    url: String,
}

impl DocumentRef {
    /// Fetch the document. Absent documents are `Ok(None)`, not errors.
    pub async fn get<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
        let response = self.store.request(Method::GET, &self.url, None).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Store {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Some(response.json::<T>().await?))
    }

    /// Write the full document, replacing any existing content.
    pub async fn set<T: Serialize>(&self, document: &T) -> Result<(), Error> {
        let body = serde_json::to_value(document)?;
        let response = self
            .store
            .request(Method::PUT, &self.url, Some(&body))
            .await?;
        self.expect_success(response).await
    }

    /// Merge the given fields into the stored document.
    pub async fn update(&self, patch: &Value) -> Result<(), Error> {
        let response = self
            .store
            .request(Method::PATCH, &self.url, Some(patch))
            .await?;
        self.expect_success(response).await
    }

    /// Permanently remove the document.
    pub async fn delete(&self) -> Result<(), Error> {
        let response = self.store.request(Method::DELETE, &self.url, None).await?;
        self.expect_success(response).await
    }

    async fn expect_success(&self, response: reqwest::Response) -> Result<(), Error> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Store {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
