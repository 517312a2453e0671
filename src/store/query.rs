//! Collection query builder

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use url::Url;

use crate::error::Error;

/// Sort direction for ordered queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn suffix(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// A query over one collection: equality filters plus an optional order.
pub struct Query {
    pub(crate) url: String,
    pub(crate) api_key: String,
    pub(crate) auth_token: Option<String>,
    pub(crate) http_client: Client,
    pub(crate) params: HashMap<String, String>,
}

impl Query {
    /// Keep only documents whose `field` equals `value`.
    pub fn filter_eq(mut self, field: &str, value: &str) -> Self {
        self.params.insert(field.to_string(), format!("eq.{}", value));
        self
    }

    /// Order the results by `field`.
    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.params
            .insert("order".to_string(), format!("{}.{}", field, order.suffix()));
        self
    }

    /// Execute the query and deserialize the matching documents.
    pub async fn execute<T: DeserializeOwned>(self) -> Result<Vec<T>, Error> {
        let mut url = Url::parse(&self.url)?;
        for (key, value) in &self.params {
            url.query_pairs_mut().append_pair(key, value);
        }

        let mut request = self
            .http_client
            .get(url)
            .header("apikey", &self.api_key);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Store {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Vec<T>>().await?)
    }
}
