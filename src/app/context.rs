use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::app::error::{Result, SedimentError};
use crate::config::Config;
use crate::domain::Platform;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::source::{RedditSource, Source, TwitterSource};
use crate::store::sqlite::SqliteStore;
use crate::sync::{BackfillOrchestrator, Paginator, RequestGovernor, SyncContext, SyncCoordinator};

/// Wires the store and one governed source per enabled platform.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    paginators: HashMap<Platform, Paginator>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = match config.store.path {
            Some(ref p) => p.clone(),
            None => Self::default_db_path()?,
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::with_store(config, store)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(SqliteStore::in_memory()?))
    }

    pub fn with_store(config: Config, store: Arc<SqliteStore>) -> Result<Self> {
        let mut paginators = HashMap::new();
        for platform in config.enabled_platforms() {
            let source = Self::build_source(&config, platform)?;
            let governor = Arc::new(RequestGovernor::new(Self::request_delay(&config, platform)));
            paginators.insert(platform, Paginator::new(source, governor));
        }

        Ok(Self {
            config,
            store,
            paginators,
        })
    }

    fn build_source(config: &Config, platform: Platform) -> Result<Arc<dyn Source>> {
        match platform {
            Platform::Reddit => {
                let fetcher: Arc<dyn Fetcher> =
                    Arc::new(HttpFetcher::new(&config.reddit.user_agent, None)?);
                Ok(Arc::new(RedditSource::new(fetcher)?))
            }
            Platform::Twitter => {
                let token = config.twitter.bearer_token.clone().ok_or_else(|| {
                    SedimentError::Config("twitter.bearer_token is not set".into())
                })?;
                let fetcher: Arc<dyn Fetcher> =
                    Arc::new(HttpFetcher::new(&config.twitter.user_agent, Some(token))?);
                Ok(Arc::new(TwitterSource::new(fetcher)?))
            }
        }
    }

    fn request_delay(config: &Config, platform: Platform) -> Duration {
        Duration::from_millis(match platform {
            Platform::Reddit => config.reddit.request_delay_ms,
            Platform::Twitter => config.twitter.request_delay_ms,
        })
    }

    /// Replace a platform's source, keeping the configured pacing.
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        let platform = source.platform();
        let governor = Arc::new(RequestGovernor::new(Self::request_delay(&self.config, platform)));
        self.paginators
            .insert(platform, Paginator::new(source, governor));
        self
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.paginators.keys().copied().collect();
        platforms.sort();
        platforms
    }

    pub fn paginator(&self, platform: Platform) -> Result<Paginator> {
        self.paginators
            .get(&platform)
            .cloned()
            .ok_or_else(|| SedimentError::Config(format!("{} is not enabled", platform)))
    }

    pub fn coordinator(&self, platform: Platform) -> Result<SyncCoordinator> {
        Ok(SyncCoordinator::new(
            self.paginator(platform)?,
            self.config.partitions(platform),
            self.config.page_size(platform),
        ))
    }

    pub fn backfill(&self, platform: Platform) -> Result<BackfillOrchestrator> {
        let backfill = &self.config.backfill;
        Ok(
            BackfillOrchestrator::new(self.paginator(platform)?, backfill.plan.clone())
                .only_if_empty(backfill.only_if_empty)
                .page_size(backfill.page_size),
        )
    }

    /// Fresh per-run state for `platform`, seeded from the store.
    pub fn sync_context(&self, platform: Platform, cancel: CancellationToken) -> SyncContext {
        SyncContext::new(platform, self.store.clone(), cancel)
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| SedimentError::Config("Could not find data directory".into()))?;
        Ok(data_dir.join("sediment").join("sediment.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Partition, Strategy};
    use crate::store::Store;
    use crate::sync::testing::{post, FakeSource, Reply};

    #[test]
    fn test_only_enabled_platforms_are_wired() {
        let ctx = AppContext::in_memory(Config::default()).unwrap();
        assert_eq!(ctx.platforms(), vec![Platform::Reddit]);
        assert!(ctx.paginator(Platform::Twitter).is_err());
        assert_eq!(
            ctx.coordinator(Platform::Reddit).unwrap().partitions(),
            &[Partition::subreddit("samsung"), Partition::subreddit("technology")]
        );
    }

    #[test]
    fn test_twitter_wired_with_token() {
        let mut config = Config::default();
        config.twitter.enabled = true;
        config.twitter.bearer_token = Some("token".into());

        let ctx = AppContext::in_memory(config).unwrap();
        assert_eq!(ctx.platforms(), vec![Platform::Reddit, Platform::Twitter]);
    }

    #[tokio::test]
    async fn test_cycle_through_app_context() {
        let mut config = Config::default();
        config.reddit.subreddits = vec!["samsung".into()];
        config.reddit.request_delay_ms = 0;

        let source = FakeSource::new(Platform::Reddit).script(
            "samsung",
            Strategy::Latest,
            vec![Reply::Page(vec![post("a", "samsung", 10)], None)],
        );
        let ctx = AppContext::in_memory(config)
            .unwrap()
            .with_source(Arc::new(source));

        let mut sync = ctx.sync_context(Platform::Reddit, CancellationToken::new());
        let stored = ctx
            .coordinator(Platform::Reddit)
            .unwrap()
            .fetch_and_store(&mut sync)
            .await;

        assert_eq!(stored, 1);
        assert_eq!(ctx.store.count_items(Platform::Reddit).unwrap(), 1);
    }
}
