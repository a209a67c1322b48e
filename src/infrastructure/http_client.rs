//! HTTP transport with global rate limiting and consent cookies
//!
//! One `HttpClient` is shared by every crawl in the process, so the governor
//! quota is the global request budget. Responses are classified into
//! `FetchError` here; callers never see raw reqwest errors.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::{
    cookie::Jar,
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER, USER_AGENT},
    Client, RequestBuilder, Response, Url,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::platform;
use crate::infrastructure::config::{defaults, HttpConfig};

/// Rate-limited HTTP client for page and API requests
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a client with the configured headers, timeout, quota and consent cookies
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language).context("Invalid Accept-Language")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(defaults::ACCEPT));

        let jar = Jar::default();
        let base = Url::parse(platform::BASE_URL).context("Invalid base URL")?;
        for (name, value) in &config.consent_cookies {
            jar.add_cookie_str(&format!("{name}={value}; Domain=.youtube.com; Path=/"), &base);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_provider(Arc::new(jar))
            .gzip(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("Rate limit must be greater than 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    /// GET `url` and return the body as text
    pub async fn get_text(&self, url: &str, cancel: &CancellationToken) -> FetchResult<String> {
        let response = self.send(self.client.get(url), url, cancel).await?;
        let text = tokio::select! {
            result = response.text() => result.map_err(|e| FetchError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })?,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };
        tracing::debug!("Fetched {} ({} chars)", url, text.len());
        Ok(text)
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json(&self, url: &str, body: &Value, cancel: &CancellationToken) -> FetchResult<Value> {
        let response = self.send(self.client.post(url).json(body), url, cancel).await?;
        tokio::select! {
            result = response.json::<Value>() => result.map_err(|e| FetchError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
        }
    }

    async fn send(&self, request: RequestBuilder, url: &str, cancel: &CancellationToken) -> FetchResult<Response> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        tokio::select! {
            _ = self.rate_limiter.until_ready() => {},
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        }

        tracing::info!("Fetching URL: {}", url);

        let response = tokio::select! {
            result = request.send() => result.map_err(|e| transport_error(&e, url))?,
            _ = cancel.cancelled() => {
                tracing::warn!("🛑 HTTP request cancelled for URL: {}", url);
                return Err(FetchError::Cancelled);
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut error = FetchError::from_status(status.as_u16(), url);
        if let FetchError::Transient {
            retry_after_seconds, ..
        } = &mut error
        {
            if let Some(seconds) = retry_after(&response) {
                *retry_after_seconds = Some(seconds);
            }
        }
        tracing::warn!("HTTP request failed with status {}: {}", status, url);
        Err(error)
    }

    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn transport_error(error: &reqwest::Error, url: &str) -> FetchError {
    let reason = if error.is_timeout() {
        "timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    };
    FetchError::transient(url, reason)
}
