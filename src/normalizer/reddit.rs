use chrono::Utc;
use serde::Deserialize;

use crate::app::{Result, SedimentError};
use crate::domain::{Item, RedditPost};
use crate::normalizer::Listing;

#[derive(Debug, Deserialize)]
struct RawListing {
    data: Option<ListingData>,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawPost {
    id: String,
    title: String,
    author: Option<String>,
    created_utc: f64,
    score: i64,
    num_comments: i64,
    url: String,
    selftext: String,
    permalink: String,
    subreddit: String,
}

impl Default for RawPost {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            author: None,
            created_utc: 0.0,
            score: 0,
            num_comments: 0,
            url: String::new(),
            selftext: String::new(),
            permalink: String::new(),
            subreddit: String::new(),
        }
    }
}

pub(super) fn parse_listing(partition_key: &str, body: &[u8]) -> Result<Listing> {
    let raw: RawListing =
        serde_json::from_slice(body).map_err(|e| SedimentError::Parse(e.to_string()))?;

    let data = raw
        .data
        .ok_or_else(|| SedimentError::Parse("Listing has no data field".into()))?;

    let fetched_at = Utc::now();
    let mut items = Vec::with_capacity(data.children.len());

    // t3 = link/post; comments and other kinds are ignored
    for thing in data.children.into_iter().filter(|t| t.kind == "t3") {
        let raw: RawPost = match serde_json::from_value(thing.data) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed post in listing");
                continue;
            }
        };
        if raw.id.is_empty() {
            continue;
        }

        let permalink = if raw.permalink.is_empty() {
            String::new()
        } else {
            format!("https://reddit.com{}", raw.permalink)
        };

        items.push(Item::Post(RedditPost {
            post_id: raw.id,
            title: raw.title,
            author: raw.author.unwrap_or_else(|| "[deleted]".to_string()),
            created_utc: raw.created_utc as i64,
            score: raw.score,
            num_comments: raw.num_comments,
            url: raw.url,
            selftext: raw.selftext,
            permalink,
            subreddit: if raw.subreddit.is_empty() {
                partition_key.to_string()
            } else {
                raw.subreddit
            },
            partition_key: partition_key.to_string(),
            fetched_at,
        }));
    }

    Ok(Listing {
        items,
        next_cursor: data.after.filter(|a| !a.is_empty()),
    })
}
