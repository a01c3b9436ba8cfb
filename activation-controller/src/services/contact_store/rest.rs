use super::{ContactStore, StoreError};
use crate::models::{AccessScope, EmergencyContact};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

/// PostgREST-style contact table (`/rest/v1/{table}`).
///
/// `api_key` identifies the project; rows are scoped by the user's own
/// access token, sent as the bearer credential.
pub struct RestContactStore {
    client: Client,
    base_url: String,
    table: String,
    api_key: Option<Secret<String>>,
}

impl RestContactStore {
    pub fn new(
        base_url: impl Into<String>,
        table: impl Into<String>,
        api_key: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table: table.into(),
            api_key,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorize(&self, request: RequestBuilder, scope: &AccessScope) -> RequestBuilder {
        let request = request.bearer_auth(scope.access_token.expose_secret());
        match &self.api_key {
            Some(key) => request.header("apikey", key.expose_secret()),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        scope: &AccessScope,
    ) -> Result<reqwest::Response, StoreError> {
        let url = self.table_url();
        let response = self.authorize(request, scope).send().await.map_err(|e| {
            tracing::error!("Failed to reach contact store at {}: {}", url, e);
            StoreError::Connection(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!(
                "Contact store returned status {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ContactStore for RestContactStore {
    async fn list_for_owner(
        &self,
        scope: &AccessScope,
    ) -> Result<Vec<EmergencyContact>, StoreError> {
        let request = self.client.get(self.table_url()).query(&[
            ("user_id", format!("eq.{}", scope.user_id)),
            ("select", "*".to_string()),
        ]);

        self.send(request, scope)
            .await?
            .json::<Vec<EmergencyContact>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn insert(
        &self,
        scope: &AccessScope,
        contact: EmergencyContact,
    ) -> Result<EmergencyContact, StoreError> {
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(&[&contact]);

        let mut created = self
            .send(request, scope)
            .await?
            .json::<Vec<EmergencyContact>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        created
            .pop()
            .ok_or_else(|| StoreError::Decode("Insert returned no representation".to_string()))
    }

    async fn delete(&self, scope: &AccessScope, contact_id: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(self.table_url())
            .header("Prefer", "return=representation")
            .query(&[
                ("id", format!("eq.{}", contact_id)),
                ("user_id", format!("eq.{}", scope.user_id)),
            ]);

        let deleted = self
            .send(request, scope)
            .await?
            .json::<Vec<EmergencyContact>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        if deleted.is_empty() {
            return Err(StoreError::NotFound(contact_id.to_string()));
        }
        Ok(())
    }
}
