use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::app::{Result, SedimentError};
use crate::domain::{Frontier, Partition, Platform, Strategy};
use crate::fetcher::Fetcher;
use crate::normalizer::{Listing, Normalizer};
use crate::source::Source;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";

/// Public JSON listings (`/r/<sub>/{new,top,hot}.json`); no auth required.
pub struct RedditSource {
    fetcher: Arc<dyn Fetcher>,
    normalizer: Normalizer,
    base_url: Url,
}

impl RedditSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Self::with_base_url(fetcher, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(fetcher: Arc<dyn Fetcher>, base_url: &str) -> Result<Self> {
        Ok(Self {
            fetcher,
            normalizer: Normalizer::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    /// Endpoint URL and the `t=` window, if any.
    fn endpoint(&self, subreddit: &str, strategy: Strategy) -> Result<(Url, Option<&'static str>)> {
        let (listing, window) = match strategy {
            Strategy::Latest => ("new", None),
            Strategy::TopAllTime => ("top", Some("all")),
            Strategy::TopPeriod(period) => ("top", Some(period.as_str())),
            Strategy::Trending => ("hot", None),
        };
        let url = self
            .base_url
            .join(&format!("r/{}/{}.json", subreddit, listing))?;
        Ok((url, window))
    }

    fn query(
        window: Option<&'static str>,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("limit", page_size.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(t) = window {
            query.push(("t", t.to_string()));
        }
        if let Some(after) = cursor {
            query.push(("after", after.to_string()));
        }
        query
    }
}

#[async_trait]
impl Source for RedditSource {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    fn supports(&self, _strategy: Strategy) -> bool {
        true
    }

    async fn fetch_page(
        &self,
        partition: &Partition,
        strategy: Strategy,
        cursor: Option<&str>,
        page_size: usize,
        _frontier: &Frontier,
    ) -> Result<Listing> {
        if partition.platform != Platform::Reddit {
            return Err(SedimentError::Other(format!(
                "{} is not a subreddit partition",
                partition
            )));
        }

        let (url, window) = self.endpoint(&partition.key, strategy)?;
        let query = Self::query(window, cursor, self.clamp_page_size(page_size));

        tracing::debug!(%partition, %strategy, url = %url, cursor, "Fetching Reddit page");
        let body = self.fetcher.fetch(url.as_str(), &query).await?;
        self.normalizer.normalize(partition, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Period;
    use std::sync::Mutex;

    struct RecordingFetcher {
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
        body: &'static str,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push((
                url.to_string(),
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ));
            Ok(self.body.as_bytes().to_vec())
        }
    }

    const PAGE: &str = r#"{"kind":"Listing","data":{"after":"t3_b","children":[
        {"kind":"t3","data":{"id":"a","title":"hello","created_utc":1700000000}}
    ]}}"#;

    fn source() -> (Arc<RecordingFetcher>, RedditSource) {
        let fetcher = Arc::new(RecordingFetcher {
            calls: Mutex::new(Vec::new()),
            body: PAGE,
        });
        let source = RedditSource::new(fetcher.clone()).unwrap();
        (fetcher, source)
    }

    #[test]
    fn test_endpoints_per_strategy() {
        let (_, source) = source();
        let (url, t) = source.endpoint("samsung", Strategy::Latest).unwrap();
        assert_eq!(url.as_str(), "https://www.reddit.com/r/samsung/new.json");
        assert_eq!(t, None);

        let (url, t) = source.endpoint("samsung", Strategy::TopAllTime).unwrap();
        assert_eq!(url.as_str(), "https://www.reddit.com/r/samsung/top.json");
        assert_eq!(t, Some("all"));

        let (_, t) = source
            .endpoint("samsung", Strategy::TopPeriod(Period::Month))
            .unwrap();
        assert_eq!(t, Some("month"));

        let (url, _) = source.endpoint("samsung", Strategy::Trending).unwrap();
        assert_eq!(url.as_str(), "https://www.reddit.com/r/samsung/hot.json");
    }

    #[tokio::test]
    async fn test_fetch_page_sends_cursor_and_clamped_limit() {
        let (fetcher, source) = source();
        let partition = Partition::subreddit("samsung");

        let listing = source
            .fetch_page(
                &partition,
                Strategy::TopPeriod(Period::Week),
                Some("t3_x"),
                500,
                &Frontier::Empty,
            )
            .await
            .unwrap();
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.next_cursor.as_deref(), Some("t3_b"));

        let calls = fetcher.calls.lock().unwrap();
        let (url, query) = &calls[0];
        assert_eq!(url, "https://www.reddit.com/r/samsung/top.json");
        assert!(query.contains(&("limit".into(), "100".into())));
        assert!(query.contains(&("raw_json".into(), "1".into())));
        assert!(query.contains(&("t".into(), "week".into())));
        assert!(query.contains(&("after".into(), "t3_x".into())));
    }

    #[tokio::test]
    async fn test_rejects_hashtag_partition() {
        let (_, source) = source();
        let result = source
            .fetch_page(
                &Partition::hashtags(["samsung"]),
                Strategy::Latest,
                None,
                25,
                &Frontier::Empty,
            )
            .await;
        assert!(result.is_err());
    }
}
