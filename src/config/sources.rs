use serde::{Deserialize, Deserializer};

use crate::daemon::DaemonConfig;
use crate::domain::Partition;

/// Accepts either plain seconds (`90`) or an interval string (`"5m"`).
pub(crate) fn deserialize_interval<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Secs(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Secs(secs) => Ok(secs),
        Repr::Text(text) => DaemonConfig::parse_interval(&text).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub enabled: bool,
    pub subreddits: Vec<String>,
    /// Posts requested per page (`limit`), 1..=100.
    pub batch_size: usize,
    #[serde(deserialize_with = "deserialize_interval")]
    pub poll_interval_secs: u64,
    pub request_delay_ms: u64,
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subreddits: vec!["samsung".to_string(), "technology".to_string()],
            batch_size: 25,
            poll_interval_secs: 60,
            request_delay_ms: 2000,
            user_agent: format!("sediment/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RedditConfig {
    pub fn partitions(&self) -> Vec<Partition> {
        let mut partitions: Vec<Partition> = self
            .subreddits
            .iter()
            .map(|s| Partition::subreddit(s))
            .filter(|p| !p.key.is_empty())
            .collect();
        partitions.dedup();
        partitions
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub enabled: bool,
    pub bearer_token: Option<String>,
    /// Hashtags searched together as one partition.
    pub hashtags: Vec<String>,
    /// Additional hashtag groups, each its own partition.
    pub groups: Vec<Vec<String>>,
    /// Tweets requested per search page, 10..=100.
    pub max_results: usize,
    #[serde(deserialize_with = "deserialize_interval")]
    pub poll_interval_secs: u64,
    pub request_delay_ms: u64,
    pub user_agent: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bearer_token: None,
            hashtags: vec!["samsung".to_string(), "technology".to_string()],
            groups: Vec::new(),
            max_results: 100,
            poll_interval_secs: 120,
            request_delay_ms: 1000,
            user_agent: format!("sediment/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TwitterConfig {
    pub fn partitions(&self) -> Vec<Partition> {
        let mut partitions = Vec::new();
        for group in std::iter::once(&self.hashtags).chain(self.groups.iter()) {
            let partition = Partition::hashtags(group);
            if !partition.key.is_empty() && !partitions.contains(&partition) {
                partitions.push(partition);
            }
        }
        partitions
    }
}
