//! Ambient Azure credentials for the management plane
//!
//! Resolution order mirrors the environment credential used by the Azure
//! SDKs: a pre-issued `AZURE_ACCESS_TOKEN` wins, otherwise a service
//! principal (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`)
//! is exchanged for a token with the client-credentials grant.

use super::OrchestrationError;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

enum TokenSource {
    Static(String),
    ClientSecret {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

/// Bearer-token provider for `management.azure.com`
pub struct AzureCredential {
    source: TokenSource,
    scope: String,
    cache: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl AzureCredential {
    /// A fixed token, used as-is for every request
    pub fn from_token(token: impl Into<String>, management_endpoint: &str) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
            scope: scope_for(management_endpoint),
            cache: RwLock::new(None),
        }
    }

    /// Resolve credentials from the process environment
    pub fn from_env(management_endpoint: &str) -> Result<Self, OrchestrationError> {
        Self::from_lookup(|key| std::env::var(key).ok(), management_endpoint)
    }

    pub fn from_lookup<F>(lookup: F, management_endpoint: &str) -> Result<Self, OrchestrationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("AZURE_ACCESS_TOKEN") {
            return Ok(Self::from_token(token, management_endpoint));
        }

        match (
            non_empty("AZURE_TENANT_ID"),
            non_empty("AZURE_CLIENT_ID"),
            non_empty("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Ok(Self {
                source: TokenSource::ClientSecret {
                    authority: non_empty("AZURE_AUTHORITY_HOST")
                        .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string())
                        .trim_end_matches('/')
                        .to_string(),
                    tenant_id,
                    client_id,
                    client_secret,
                },
                scope: scope_for(management_endpoint),
                cache: RwLock::new(None),
            }),
            _ => Err(OrchestrationError::Auth(
                "No Azure credentials found: set AZURE_ACCESS_TOKEN or \
                 AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET"
                    .to_string(),
            )),
        }
    }

    /// Return a valid access token, fetching a new one when the cache is stale
    pub async fn token(&self, http: &reqwest::Client) -> Result<String, OrchestrationError> {
        let (authority, tenant_id, client_id, client_secret) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ClientSecret {
                authority,
                tenant_id,
                client_id,
                client_secret,
            } => (authority, tenant_id, client_id, client_secret),
        };

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| Instant::now() < c.refresh_at) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref().filter(|c| Instant::now() < c.refresh_at) {
            return Ok(cached.access_token.clone());
        }

        debug!("Requesting management token for tenant {}", tenant_id);
        let url = format!("{}/{}/oauth2/v2.0/token", authority, tenant_id);
        let response = http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

impl fmt::Debug for AzureCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            TokenSource::Static(_) => f
                .debug_struct("AzureCredential")
                .field("source", &"static token ****")
                .finish(),
            TokenSource::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("AzureCredential")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"****")
                .finish(),
        }
    }
}

fn scope_for(management_endpoint: &str) -> String {
    format!("{}/.default", management_endpoint.trim_end_matches('/'))
}
