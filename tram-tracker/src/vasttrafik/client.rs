//! Västtrafik Planera Resa HTTP client.
//!
//! Provides async methods for querying stop areas, live arrivals and
//! departures, and journey details. Handles OAuth2 client-credentials
//! authentication and bounds the number of concurrent requests.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{Arrival, Departure, JourneyDetail, StopArea};

use super::api::{JourneyInclude, TransitApi};
use super::error::TransitError;

/// Default host for the Västtrafik API.
const DEFAULT_BASE_URL: &str = "https://ext-api.vasttrafik.se";

/// Requests allowed in flight at once unless configured otherwise.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Tokens are renewed this long before they actually expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Configuration for the Västtrafik client.
#[derive(Debug, Clone)]
pub struct VasttrafikConfig {
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// API host, production unless overridden
    pub base_url: String,
    /// Upper bound on requests in flight
    pub max_concurrent: usize,
    /// Per-request timeout, seconds
    pub timeout_secs: u64,
}

impl VasttrafikConfig {
    /// Create a new config with the given credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: 30,
        }
    }

    /// Point the client at another host, such as a local stub.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    renew_at: Instant,
}

/// One page of a paginated list response. Only the results are used.
#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Option<Vec<T>>,
}

/// Västtrafik API client.
///
/// Cheap to clone; clones share the access token and the request semaphore.
#[derive(Debug, Clone)]
pub struct VasttrafikClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<AccessToken>>>,
    semaphore: Arc<Semaphore>,
}

impl VasttrafikClient {
    /// Create a new client with the given configuration.
    pub fn new(config: VasttrafikConfig) -> Result<Self, TransitError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(TransitError::NotConfigured(
                "client id and secret are required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id,
            client_secret: config.client_secret,
            token: Arc::new(Mutex::new(None)),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
        })
    }

    /// Returns a valid access token, exchanging credentials if needed.
    async fn access_token(&self) -> Result<String, TransitError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref()
            && Instant::now() < token.renew_at
        {
            return Ok(token.value.clone());
        }

        debug!("Exchanging client credentials for access token");
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransitError::TokenExchange {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let token = AccessToken {
            value: body.access_token,
            renew_at: Instant::now() + lifetime,
        };
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    /// GET a planner API path and decode the JSON body.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransitError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| TransitError::Api {
                status: 0,
                message: "Semaphore closed".to_string(),
            })?;

        let token = self.access_token().await?;
        let url = format!("{}/pr/v4/{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(query)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                // Force a fresh token next time.
                self.token.lock().await.take();
                return Err(TransitError::Unauthorized);
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(TransitError::RateLimited),
            StatusCode::NOT_FOUND => return Err(TransitError::NotFound(path.to_string())),
            status if !status.is_success() => {
                return Err(TransitError::Api {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }
            _ => {}
        }

        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| TransitError::Json {
            message: e.to_string(),
            body: Some(body.chars().take(500).collect()),
        })
    }
}

impl TransitApi for VasttrafikClient {
    async fn stop_areas(&self) -> Result<Vec<StopArea>, TransitError> {
        self.get("stop-areas", &[]).await
    }

    async fn arrivals_for_stop(&self, gid: &str) -> Result<Vec<Arrival>, TransitError> {
        let page: Page<Arrival> = self
            .get(
                &format!("stop-points/{gid}/arrivals"),
                &[("maxArrivalsPerLineAndDirection", "1".to_string())],
            )
            .await?;
        Ok(page.results.unwrap_or_default())
    }

    async fn departures_for_stop(&self, gid: &str) -> Result<Vec<Departure>, TransitError> {
        let page: Page<Departure> = self
            .get(&format!("stop-points/{gid}/departures"), &[])
            .await?;
        Ok(page.results.unwrap_or_default())
    }

    async fn journey_detail(
        &self,
        reference: &str,
        includes: &[JourneyInclude],
    ) -> Result<JourneyDetail, TransitError> {
        let query: Vec<(&str, String)> = includes
            .iter()
            .map(|i| ("includes", i.as_str().to_string()))
            .collect();
        self.get(&format!("journeys/{reference}/details"), &query)
            .await
    }
}
