//! Upstream sources: one per platform, each knowing how to turn a
//! (partition, strategy, cursor) triple into a request and a [`Listing`].

pub mod reddit;
pub mod twitter;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::{Frontier, Partition, Platform, Strategy};
use crate::normalizer::Listing;

pub use reddit::RedditSource;
pub use twitter::TwitterSource;

#[async_trait]
pub trait Source: Send + Sync {
    fn platform(&self) -> Platform;

    fn max_page_size(&self) -> usize {
        100
    }

    fn min_page_size(&self) -> usize {
        1
    }

    fn supports(&self, strategy: Strategy) -> bool;

    /// Fetch one page. `frontier` lets sources that support server-side
    /// filtering (X `since_id`) skip already ingested items; callers still
    /// filter locally.
    async fn fetch_page(
        &self,
        partition: &Partition,
        strategy: Strategy,
        cursor: Option<&str>,
        page_size: usize,
        frontier: &Frontier,
    ) -> Result<Listing>;

    fn clamp_page_size(&self, requested: usize) -> usize {
        requested.clamp(self.min_page_size(), self.max_page_size())
    }

    /// Smallest possible request against `partition`, used by `sediment check`.
    async fn check(&self, partition: &Partition) -> Result<usize> {
        let listing = self
            .fetch_page(
                partition,
                Strategy::Latest,
                None,
                self.min_page_size(),
                &Frontier::Empty,
            )
            .await?;
        Ok(listing.items.len())
    }
}
