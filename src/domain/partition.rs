use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    Twitter,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Reddit, Platform::Twitter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::Twitter => "twitter",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reddit" => Ok(Platform::Reddit),
            "twitter" | "x" => Ok(Platform::Twitter),
            other => Err(format!("Unknown platform: {}", other)),
        }
    }
}

/// An independently tracked monitoring unit: one subreddit, or one group
/// of hashtags searched together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    pub platform: Platform,
    pub key: String,
}

impl Partition {
    pub fn subreddit(name: &str) -> Self {
        let name = name.trim();
        let name = name
            .strip_prefix("/r/")
            .or_else(|| name.strip_prefix("r/"))
            .unwrap_or(name);
        Self {
            platform: Platform::Reddit,
            key: name.to_lowercase(),
        }
    }

    /// Build a hashtag partition. Tags are normalized (leading `#` removed,
    /// lower-cased, sorted, deduplicated) so the same set always maps to the
    /// same key.
    pub fn hashtags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = tags
            .into_iter()
            .map(|t| t.as_ref().trim().trim_start_matches('#').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();

        Self {
            platform: Platform::Twitter,
            key: tags.join(","),
        }
    }

    pub fn hashtag_list(&self) -> Vec<&str> {
        self.key.split(',').filter(|t| !t.is_empty()).collect()
    }

    /// Upstream search query for a hashtag partition: `#a OR #b`.
    pub fn search_query(&self) -> String {
        self.hashtag_list()
            .iter()
            .map(|t| format!("#{}", t))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.platform {
            Platform::Reddit => write!(f, "r/{}", self.key),
            Platform::Twitter => {
                let tags: Vec<String> =
                    self.hashtag_list().iter().map(|t| format!("#{}", t)).collect();
                write!(f, "{}", tags.join(","))
            }
        }
    }
}

/// High-water mark of a partition: everything at or before it is already
/// ingested.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Frontier {
    #[default]
    Empty,
    /// Unix seconds of the newest stored item.
    Timestamp(i64),
    /// Id of the newest stored item under the platform's id ordering.
    Id(String),
}

impl Frontier {
    pub fn is_empty(&self) -> bool {
        matches!(self, Frontier::Empty)
    }

    /// Whether `self` is strictly newer than `other`.
    ///
    /// Markers of different kinds are incomparable and never newer.
    pub fn is_newer_than(&self, other: &Frontier) -> bool {
        match (self, other) {
            (Frontier::Empty, _) => false,
            (_, Frontier::Empty) => true,
            (Frontier::Timestamp(a), Frontier::Timestamp(b)) => a > b,
            (Frontier::Id(a), Frontier::Id(b)) => compare_ids(a, b) == Ordering::Greater,
            _ => false,
        }
    }

    /// Whether `item` lies strictly beyond this frontier.
    pub fn admits(&self, item: &Item) -> bool {
        item.marker().is_newer_than(self)
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            Frontier::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Frontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frontier::Empty => f.write_str("empty"),
            Frontier::Timestamp(ts) => write!(f, "ts:{}", ts),
            Frontier::Id(id) => write!(f, "id:{}", id),
        }
    }
}

/// Snowflake-style ids compare numerically; anything else falls back to
/// (length, lexical) which agrees with numeric order for digit strings.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}
