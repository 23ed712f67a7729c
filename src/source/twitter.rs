use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::app::{Result, SedimentError};
use crate::domain::{Frontier, Partition, Platform, Strategy};
use crate::fetcher::Fetcher;
use crate::normalizer::{Listing, Normalizer};
use crate::source::Source;

pub const DEFAULT_SEARCH_URL: &str = "https://api.x.com/2/tweets/search/recent";

const TWEET_FIELDS: &str = "id,text,author_id,created_at,public_metrics,lang,conversation_id,in_reply_to_user_id,referenced_tweets";
const USER_FIELDS: &str = "username,name,verified";

/// X API v2 recent search. The fetcher is expected to carry the bearer token.
pub struct TwitterSource {
    fetcher: Arc<dyn Fetcher>,
    normalizer: Normalizer,
    search_url: Url,
}

impl TwitterSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Self::with_search_url(fetcher, DEFAULT_SEARCH_URL)
    }

    pub fn with_search_url(fetcher: Arc<dyn Fetcher>, search_url: &str) -> Result<Self> {
        Ok(Self {
            fetcher,
            normalizer: Normalizer::new(),
            search_url: Url::parse(search_url)?,
        })
    }

    fn query(
        partition: &Partition,
        strategy: Strategy,
        cursor: Option<&str>,
        page_size: usize,
        frontier: &Frontier,
    ) -> Result<Vec<(&'static str, String)>> {
        let sort_order = match strategy {
            Strategy::Latest => "recency",
            Strategy::Trending => "relevancy",
            other => return Err(SedimentError::UnsupportedStrategy(other)),
        };

        let mut query = vec![
            ("query", partition.search_query()),
            ("max_results", page_size.to_string()),
            ("sort_order", sort_order.to_string()),
            ("tweet.fields", TWEET_FIELDS.to_string()),
            ("expansions", "author_id".to_string()),
            ("user.fields", USER_FIELDS.to_string()),
        ];
        if strategy == Strategy::Latest {
            if let Some(since_id) = frontier.as_id() {
                query.push(("since_id", since_id.to_string()));
            }
        }
        if let Some(token) = cursor {
            query.push(("next_token", token.to_string()));
        }
        Ok(query)
    }
}

#[async_trait]
impl Source for TwitterSource {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn min_page_size(&self) -> usize {
        10
    }

    fn supports(&self, strategy: Strategy) -> bool {
        matches!(strategy, Strategy::Latest | Strategy::Trending)
    }

    async fn fetch_page(
        &self,
        partition: &Partition,
        strategy: Strategy,
        cursor: Option<&str>,
        page_size: usize,
        frontier: &Frontier,
    ) -> Result<Listing> {
        if partition.platform != Platform::Twitter {
            return Err(SedimentError::Other(format!(
                "{} is not a hashtag partition",
                partition
            )));
        }

        let query = Self::query(
            partition,
            strategy,
            cursor,
            self.clamp_page_size(page_size),
            frontier,
        )?;

        tracing::debug!(%partition, %strategy, cursor, "Searching recent tweets");
        let body = self.fetcher.fetch(self.search_url.as_str(), &query).await?;
        self.normalizer.normalize(partition, &body)
    }
}
