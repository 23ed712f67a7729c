use std::collections::HashMap;

use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use serde::Deserialize;

use crate::app::{Result, SedimentError};
use crate::domain::{Item, ReferencedTweet, Tweet};
use crate::normalizer::Listing;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Option<Vec<RawTweet>>,
    #[serde(default)]
    includes: Includes,
    meta: Option<Meta>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    username: Option<String>,
    name: Option<String>,
    #[serde(default)]
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct RawTweet {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    author_id: String,
    #[serde(default)]
    created_at: String,
    lang: Option<String>,
    #[serde(default)]
    public_metrics: Metrics,
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    in_reply_to_user_id: String,
    #[serde(default)]
    referenced_tweets: Vec<RawReference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metrics {
    retweet_count: i64,
    like_count: i64,
    reply_count: i64,
    quote_count: i64,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

/// Unparsable timestamps fall back to the current time, matching upstream
/// behavior of treating them as "just seen".
fn parse_created_at(s: &str) -> i64 {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|_| Utc::now().timestamp())
}

pub(super) fn parse_search(partition_key: &str, body: &[u8]) -> Result<Listing> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|e| SedimentError::Parse(e.to_string()))?;

    if response.data.is_none() && response.meta.is_none() {
        return Err(SedimentError::Parse(
            "Search response has neither data nor meta".into(),
        ));
    }

    let users: HashMap<&str, &RawUser> = response
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u))
        .collect();

    let fetched_at = Utc::now();
    let items = response
        .data
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|raw| {
            let user = users.get(raw.author_id.as_str());
            let text = decode_html_entities(&raw.text).to_string();

            Item::Message(Tweet {
                tweet_id: raw.id.clone(),
                hashtags: Tweet::extract_hashtags(&text),
                text,
                author_id: raw.author_id.clone(),
                author_username: user
                    .and_then(|u| u.username.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                author_name: user
                    .and_then(|u| u.name.clone())
                    .unwrap_or_else(|| "Unknown User".to_string()),
                author_verified: user.map(|u| u.verified).unwrap_or(false),
                created_utc: parse_created_at(&raw.created_at),
                created_at: raw.created_at.clone(),
                lang: raw.lang.clone().unwrap_or_else(|| "und".to_string()),
                retweet_count: raw.public_metrics.retweet_count,
                like_count: raw.public_metrics.like_count,
                reply_count: raw.public_metrics.reply_count,
                quote_count: raw.public_metrics.quote_count,
                conversation_id: raw.conversation_id.clone(),
                in_reply_to_user_id: raw.in_reply_to_user_id.clone(),
                referenced_tweets: raw
                    .referenced_tweets
                    .iter()
                    .map(|r| ReferencedTweet {
                        kind: r.kind.clone(),
                        id: r.id.clone(),
                    })
                    .collect(),
                partition_key: partition_key.to_string(),
                fetched_at,
            })
        })
        .collect();

    Ok(Listing {
        items,
        next_cursor: response.meta.and_then(|m| m.next_token),
    })
}
