pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::HttpFetcher;

/// One GET against an upstream API, returning the raw body.
///
/// Implementations must report HTTP 429 as
/// [`SedimentError::RateLimited`](crate::app::SedimentError::RateLimited)
/// so callers can back off at the strategy or cycle level.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>>;
}
