//! Vendor-neutral JSON provider
//!
//! Talks to booking back-ends that expose seat data as JSON:
//!
//! - `GET {detail_url}` → `{"auditorium": "Saal 2", "seats_remaining": 87, "capacity": 120}`
//! - `GET {venue_url}` → `{"token": "..."}` (when credentials are required)
//! - `POST {detail_url}/hold` with `{"seats": n}` → `{"ok": true}` (capacity probe)
//!
//! Requests are spaced by a per-provider minimum interval and bounded by a
//! request timeout.

use super::{CapacityProbe, ProbeRequest, Provider, SeatProbe};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("SeatWatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SeatResponse {
    #[serde(default, alias = "screen", alias = "hall")]
    auditorium: Option<String>,
    #[serde(default, alias = "free", alias = "available")]
    seats_remaining: Option<i64>,
    #[serde(default, alias = "sold")]
    seats_sold: Option<i64>,
    #[serde(default, alias = "total")]
    capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct HoldRequest {
    seats: i64,
}

#[derive(Debug, Deserialize)]
struct HoldResponse {
    ok: bool,
}

/// Rate limiter enforcing a minimum spacing between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::trace!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// JSON-speaking provider configured from a `[[providers]]` entry
pub struct JsonApiProvider {
    tag: String,
    priority: u8,
    venue_patterns: Vec<String>,
    requires_credential: bool,
    capacity_probe: bool,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl JsonApiProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            tag: config.tag.clone(),
            priority: config.priority,
            venue_patterns: config
                .venue_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            requires_credential: config.requires_credential,
            capacity_probe: config.capacity_probe,
            http_client,
            rate_limiter: RateLimiter::new(config.min_request_interval_ms),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(ProviderError::Http(status.as_u16(), error_text))
        }
    }
}

#[async_trait]
impl Provider for JsonApiProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn classify(&self, venue_name: &str) -> bool {
        let name = venue_name.to_lowercase();
        self.venue_patterns.iter().any(|p| name.contains(p.as_str()))
    }

    async fn probe_seats(&self, request: &ProbeRequest) -> Result<SeatProbe, ProviderError> {
        let url = request
            .detail_url
            .as_deref()
            .ok_or(ProviderError::Unsupported("probe without detail url"))?;

        self.rate_limiter.wait().await;

        tracing::debug!(provider = %self.tag, show_id = request.show_id, url = %url, "Probing seats");

        let mut builder = self.http_client.get(url);
        if let Some(token) = &request.credential {
            builder = builder.bearer_auth(token);
        }

        let response = Self::check_status(builder.send().await?).await?;
        let body: SeatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if body.seats_remaining.is_none() && body.seats_sold.is_none() {
            return Err(ProviderError::Parse(
                "response carries neither seats_remaining nor seats_sold".to_string(),
            ));
        }

        Ok(SeatProbe {
            auditorium: body.auditorium,
            seats_remaining: body.seats_remaining,
            seats_sold: body.seats_sold,
            capacity: body.capacity,
            source: self.tag.clone(),
        })
    }

    fn supports_capacity_probe(&self) -> bool {
        self.capacity_probe
    }

    async fn probe_capacity_candidate(
        &self,
        detail_url: &str,
        candidate: i64,
    ) -> Result<CapacityProbe, ProviderError> {
        if !self.capacity_probe {
            return Err(ProviderError::Unsupported("probe_capacity_candidate"));
        }

        self.rate_limiter.wait().await;

        let url = format!("{}/hold", detail_url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(&url)
            .json(&HoldRequest { seats: candidate })
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: HoldResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(CapacityProbe { ok: body.ok })
    }

    fn requires_credential(&self) -> bool {
        self.requires_credential
    }

    async fn fetch_credential(&self, venue_url: &str) -> Result<String, ProviderError> {
        if !self.requires_credential {
            return Err(ProviderError::Unsupported("fetch_credential"));
        }

        self.rate_limiter.wait().await;

        let response = Self::check_status(self.http_client.get(venue_url).send().await?).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if body.token.trim().is_empty() {
            return Err(ProviderError::Parse("empty token".to_string()));
        }
        Ok(body.token)
    }
}
