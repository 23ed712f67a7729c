//! Configuration for sediment.
//!
//! Configuration is read from `~/.config/sediment/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! A few environment variables override the file (see [`Config::apply_env`]).

pub mod sources;

pub use sources::{RedditConfig, TwitterConfig};

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::{default_plan, Partition, Platform, PlanStep};

/// Shortest poll interval accepted from config or the command line.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

/// Main configuration struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub reddit: RedditConfig,
    pub twitter: TwitterConfig,
    pub backfill: BackfillConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            reddit: RedditConfig::default(),
            twitter: TwitterConfig::default(),
            backfill: BackfillConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; defaults to `<data dir>/sediment/sediment.db`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Base number of items; each plan step gets `budget * share`.
    pub budget: usize,
    pub only_if_empty: bool,
    pub page_size: usize,
    pub plan: Vec<PlanStep>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            budget: 1000,
            only_if_empty: false,
            page_size: 100,
            plan: default_plan(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields use default values. Environment overrides are applied
    /// and the result validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::create_default_config(&config_path)?;
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/sediment/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("sediment").join("config.toml"))
    }

    /// Apply `SUBREDDITS`, `TWITTER_HASHTAGS`, `TWITTER_BEARER_TOKEN` and
    /// `LOG_LEVEL` from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let list = |value: String| -> Vec<String> {
            value
                .split(',')
                .map(|s| s.trim().trim_start_matches('#').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        if let Some(subreddits) = lookup("SUBREDDITS") {
            self.reddit.subreddits = list(subreddits);
        }
        if let Some(hashtags) = lookup("TWITTER_HASHTAGS") {
            self.twitter.hashtags = list(hashtags);
        }
        if let Some(token) = lookup("TWITTER_BEARER_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.twitter.bearer_token = Some(token.trim().to_string());
            self.twitter.enabled = true;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
    }

    /// Check every rule and report all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.reddit.enabled {
            if self.reddit.partitions().is_empty() {
                errors.push("at least one subreddit is required".to_string());
            }
            for name in &self.reddit.subreddits {
                let bare = Partition::subreddit(name).key;
                if bare.is_empty()
                    || !bare
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    errors.push(format!("invalid subreddit name: {:?}", name));
                }
            }
            if !(1..=100).contains(&self.reddit.batch_size) {
                errors.push("reddit.batch_size must be between 1 and 100".to_string());
            }
            if self.reddit.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
                errors.push(format!(
                    "reddit.poll_interval_secs must be at least {} seconds",
                    MIN_POLL_INTERVAL_SECS
                ));
            }
        }

        if self.twitter.enabled {
            if self
                .twitter
                .bearer_token
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
            {
                errors.push(
                    "twitter.bearer_token (or TWITTER_BEARER_TOKEN) is required".to_string(),
                );
            }
            if self.twitter.partitions().is_empty() {
                errors.push("at least one hashtag is required".to_string());
            }
            if !(10..=100).contains(&self.twitter.max_results) {
                errors.push("twitter.max_results must be between 10 and 100".to_string());
            }
            if self.twitter.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
                errors.push(format!(
                    "twitter.poll_interval_secs must be at least {} seconds",
                    MIN_POLL_INTERVAL_SECS
                ));
            }
        }

        for step in &self.backfill.plan {
            if !(step.share.is_finite() && step.share > 0.0) {
                errors.push(format!(
                    "backfill share for {} must be positive",
                    step.strategy
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn enabled_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.is_enabled(*p))
            .collect()
    }

    pub fn is_enabled(&self, platform: Platform) -> bool {
        match platform {
            Platform::Reddit => self.reddit.enabled,
            Platform::Twitter => self.twitter.enabled,
        }
    }

    pub fn partitions(&self, platform: Platform) -> Vec<Partition> {
        match platform {
            Platform::Reddit => self.reddit.partitions(),
            Platform::Twitter => self.twitter.partitions(),
        }
    }

    pub fn poll_interval_secs(&self, platform: Platform) -> u64 {
        match platform {
            Platform::Reddit => self.reddit.poll_interval_secs,
            Platform::Twitter => self.twitter.poll_interval_secs,
        }
    }

    pub fn page_size(&self, platform: Platform) -> usize {
        match platform {
            Platform::Reddit => self.reddit.batch_size,
            Platform::Twitter => self.twitter.max_results,
        }
    }

    /// Write the default configuration, creating parent directories.
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    pub fn default_config_content() -> String {
        r##"# sediment configuration
#
# Intervals accept seconds (90) or a duration string ("30s", "5m", "1h", "1d").
# Environment overrides: SUBREDDITS, TWITTER_HASHTAGS (comma separated),
# TWITTER_BEARER_TOKEN, LOG_LEVEL.

# trace, debug, info, warn or error. RUST_LOG takes precedence.
log_level = "info"

[store]
# Database file. Defaults to the platform data directory.
# path = "/var/lib/sediment/sediment.db"

[reddit]
enabled = true
subreddits = ["samsung", "technology"]
# Posts per request, 1-100
batch_size = 25
poll_interval_secs = "1m"
# Minimum spacing between requests
request_delay_ms = 2000
user_agent = "sediment/0.1"

[twitter]
# Requires an X API v2 bearer token
enabled = false
# bearer_token = "..."
# Searched together as one query: #samsung OR #technology
hashtags = ["samsung", "technology"]
# Extra hashtag groups, each tracked separately
# groups = [["pixel", "android"]]
# Tweets per request, 10-100
max_results = 100
poll_interval_secs = "2m"
request_delay_ms = 1000
user_agent = "sediment/0.1"

[backfill]
# Base item budget per partition
budget = 1000
# Only backfill partitions with nothing stored yet
only_if_empty = false
page_size = 100

# Strategies run in order, each with budget * share.
# Strategies: latest, top:all, top:year, top:month, top:week, top:day,
# top:hour, trending. X supports latest and trending only.
[[backfill.plan]]
strategy = "top:all"
share = 1.0

[[backfill.plan]]
strategy = "top:year"
share = 0.3333333333333333

[[backfill.plan]]
strategy = "top:month"
share = 0.3333333333333333

[[backfill.plan]]
strategy = "top:week"
share = 0.3333333333333333

[[backfill.plan]]
strategy = "trending"
share = 0.5
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Period, Strategy};
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert!(config.reddit.enabled);
        assert_eq!(config.reddit.poll_interval_secs, 60);
        assert_eq!(config.twitter.poll_interval_secs, 120);
        assert_eq!(config.backfill.plan.len(), 5);
        assert_eq!(config.backfill.plan[1].strategy, Strategy::TopPeriod(Period::Year));

        let budgets: Vec<usize> = config.backfill.plan.iter().map(|s| s.budget(1000)).collect();
        assert_eq!(budgets, vec![1000, 333, 333, 333, 500]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[reddit]
subreddits = ["android"]
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.reddit.subreddits, vec!["android"]);
        assert_eq!(config.reddit.batch_size, 25);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.backfill.plan, default_plan());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("SUBREDDITS", "samsung, galaxy ,"),
            ("TWITTER_HASHTAGS", "#Samsung,#GalaxyS24"),
            ("TWITTER_BEARER_TOKEN", "secret"),
            ("LOG_LEVEL", "DEBUG"),
        ]));

        assert_eq!(config.reddit.subreddits, vec!["samsung", "galaxy"]);
        assert_eq!(config.twitter.hashtags, vec!["Samsung", "GalaxyS24"]);
        assert_eq!(config.twitter.bearer_token.as_deref(), Some("secret"));
        assert!(config.twitter.enabled);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.partitions(Platform::Twitter)[0].key, "galaxys24,samsung");
    }

    #[test]
    fn test_twitter_requires_token() {
        let mut config = Config::default();
        config.twitter.enabled = true;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bearer_token"));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.reddit.subreddits = vec!["bad name!".into()];
        config.reddit.batch_size = 0;
        config.reddit.poll_interval_secs = 5;
        config.backfill.plan = vec![PlanStep::new(Strategy::Trending, 0.0)];

        match config.validate() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_twitter_max_results_bounds() {
        let mut config = Config::default();
        config.twitter.enabled = true;
        config.twitter.bearer_token = Some("t".into());
        config.twitter.max_results = 5;
        assert!(config.validate().is_err());

        config.twitter.max_results = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::from_file(&path);
        assert!(config.is_err());

        Config::create_default_config(&path).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.reddit.subreddits, vec!["samsung", "technology"]);
    }

    #[test]
    fn test_enabled_platforms() {
        let mut config = Config::default();
        assert_eq!(config.enabled_platforms(), vec![Platform::Reddit]);

        config.twitter.enabled = true;
        config.reddit.enabled = false;
        assert_eq!(config.enabled_platforms(), vec![Platform::Twitter]);
        assert_eq!(config.page_size(Platform::Twitter), 100);
    }
}
