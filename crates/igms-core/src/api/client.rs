//! REST client for a statistics backend.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, Client, Url};
use tracing::{debug, warn};

use super::{ApiError, StatisticsSource};
use crate::models::Statistics;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Statistics over HTTP: `GET {base_url}/statistics?department=..&from=..&to=..`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and clones share the bearer token.
#[derive(Clone)]
pub struct HttpStatisticsSource {
    client: Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpStatisticsSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid statistics base URL: {}", base_url))?;

        Ok(Self {
            client,
            base_url,
            token: Arc::default(),
        })
    }

    /// Send `token` as bearer credentials from now on; `None` stops sending one.
    pub fn set_token(&self, token: Option<&str>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token.map(str::to_string);
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn statistics_url(&self, department: &str, from: NaiveDate, to: NaiveDate) -> Result<Url> {
        let mut url = self
            .base_url
            .join("statistics")
            .context("Failed to build statistics URL")?;
        url.query_pairs_mut()
            .append_pair("department", department)
            .append_pair("from", &from.format("%Y-%m-%d").to_string())
            .append_pair("to", &to.format("%Y-%m-%d").to_string());
        Ok(url)
    }

    /// Check if response is successful. Returns Ok(None) when rate limited
    /// (caller should retry), or Err for other failures.
    async fn check_response_for_retry(
        response: reqwest::Response,
        department: &str,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, department, &body).into())
        }
    }
}

#[async_trait]
impl StatisticsSource for HttpStatisticsSource {
    async fn fetch_aggregate(&self, department: &str, from: NaiveDate, to: NaiveDate) -> Result<Statistics> {
        let url = self.statistics_url(department, from, to)?;
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            debug!(url = %url, "Fetching statistics");
            let mut request = self
                .client
                .get(url.clone())
                .header(header::ACCEPT, "application/json");
            if let Some(token) = self.token() {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response, department).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited {
                            retries: MAX_RATE_LIMIT_RETRIES,
                        }
                        .into());
                    }
                    warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}
