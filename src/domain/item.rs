use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Frontier, Platform};

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").expect("valid hashtag regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub post_id: String,
    pub title: String,
    pub author: String,
    pub created_utc: i64,
    pub score: i64,
    pub num_comments: i64,
    pub url: String,
    pub selftext: String,
    pub permalink: String,
    /// Subreddit with the casing upstream reports.
    pub subreddit: String,
    /// Configured partition this post was fetched for.
    pub partition_key: String,
    pub fetched_at: DateTime<Utc>,
}

impl RedditPost {
    pub fn new(post_id: &str, partition_key: &str, created_utc: i64) -> Self {
        Self {
            post_id: post_id.to_string(),
            title: String::new(),
            author: "[deleted]".to_string(),
            created_utc,
            score: 0,
            num_comments: 0,
            url: String::new(),
            selftext: String::new(),
            permalink: String::new(),
            subreddit: partition_key.to_string(),
            partition_key: partition_key.to_string(),
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedTweet {
    /// `retweeted`, `quoted` or `replied_to`.
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub tweet_id: String,
    pub text: String,
    pub author_id: String,
    pub author_username: String,
    pub author_name: String,
    pub author_verified: bool,
    /// Upstream ISO-8601 timestamp, kept verbatim.
    pub created_at: String,
    pub created_utc: i64,
    pub lang: String,
    pub retweet_count: i64,
    pub like_count: i64,
    pub reply_count: i64,
    pub quote_count: i64,
    pub conversation_id: String,
    pub in_reply_to_user_id: String,
    pub referenced_tweets: Vec<ReferencedTweet>,
    pub hashtags: Vec<String>,
    pub partition_key: String,
    pub fetched_at: DateTime<Utc>,
}

impl Tweet {
    pub fn new(tweet_id: &str, partition_key: &str, created_utc: i64) -> Self {
        Self {
            tweet_id: tweet_id.to_string(),
            text: String::new(),
            author_id: String::new(),
            author_username: "unknown".to_string(),
            author_name: "Unknown User".to_string(),
            author_verified: false,
            created_at: DateTime::from_timestamp(created_utc, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
            created_utc,
            lang: "und".to_string(),
            retweet_count: 0,
            like_count: 0,
            reply_count: 0,
            quote_count: 0,
            conversation_id: String::new(),
            in_reply_to_user_id: String::new(),
            referenced_tweets: Vec::new(),
            hashtags: Vec::new(),
            partition_key: partition_key.to_string(),
            fetched_at: Utc::now(),
        }
    }

    /// Lower-cased hashtags found in `text`, in order of appearance.
    pub fn extract_hashtags(text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        HASHTAG_RE
            .captures_iter(&lowered)
            .map(|c| c[1].to_string())
            .collect()
    }
}

/// A fetched post or message in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Post(RedditPost),
    Message(Tweet),
}

impl Item {
    pub fn platform(&self) -> Platform {
        match self {
            Item::Post(_) => Platform::Reddit,
            Item::Message(_) => Platform::Twitter,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Item::Post(p) => &p.post_id,
            Item::Message(t) => &t.tweet_id,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Item::Post(p) => &p.author,
            Item::Message(t) => &t.author_id,
        }
    }

    pub fn created_utc(&self) -> i64 {
        match self {
            Item::Post(p) => p.created_utc,
            Item::Message(t) => t.created_utc,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created_utc(), 0).unwrap_or_default()
    }

    pub fn partition_key(&self) -> &str {
        match self {
            Item::Post(p) => &p.partition_key,
            Item::Message(t) => &t.partition_key,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Item::Post(p) => &p.title,
            Item::Message(t) => &t.text,
        }
    }

    /// The frontier this item would establish if it were the newest stored.
    pub fn marker(&self) -> Frontier {
        match self {
            Item::Post(p) => Frontier::Timestamp(p.created_utc),
            Item::Message(t) => Frontier::Id(t.tweet_id.clone()),
        }
    }

    /// Short single-line form for log output.
    pub fn headline(&self) -> String {
        let text = self.text().replace('\n', " ");
        if text.chars().count() > 80 {
            let cut: String = text.chars().take(77).collect();
            format!("{}...", cut)
        } else {
            text
        }
    }
}
