use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};

use crate::app::{Result, SedimentError};
use crate::fetcher::Fetcher;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest client bound to one identity (user agent, optional bearer token).
pub struct HttpFetcher {
    client: Client,
    bearer_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, bearer_token: Option<String>) -> Result<Self> {
        Self::with_timeout(user_agent, bearer_token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        user_agent: &str,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            bearer_token,
        })
    }

    /// Reset time from either `x-rate-limit-reset` (absolute epoch seconds,
    /// X API) or `x-ratelimit-reset` (seconds remaining, Reddit).
    fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        if let Some(epoch) = header("x-rate-limit-reset").and_then(|v| v.trim().parse::<i64>().ok())
        {
            return DateTime::from_timestamp(epoch, 0);
        }

        header("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|secs| Utc::now() + chrono::Duration::milliseconds((secs * 1000.0) as i64))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let mut request = self.client.get(url).query(query);
        if let Some(ref token) = self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = Self::rate_limit_reset(response.headers());
            tracing::warn!(
                url,
                remaining = response
                    .headers()
                    .get("x-rate-limit-remaining")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown"),
                "Upstream rate limit exceeded"
            );
            return Err(SedimentError::RateLimited { reset_at });
        }

        if !status.is_success() {
            return Err(SedimentError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?.to_vec();
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_reset_from_absolute_epoch() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-reset", HeaderValue::from_static("1700000000"));
        let reset = HttpFetcher::rate_limit_reset(&headers).unwrap();
        assert_eq!(reset.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_reset_from_relative_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("120"));
        let reset = HttpFetcher::rate_limit_reset(&headers).unwrap();
        let delta = reset.signed_duration_since(Utc::now()).num_seconds();
        assert!((118..=120).contains(&delta));
    }

    #[test]
    fn test_reset_missing() {
        assert!(HttpFetcher::rate_limit_reset(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_builds_with_bearer_token() {
        assert!(HttpFetcher::new("sediment-test/0.1", Some("token".into())).is_ok());
    }
}
