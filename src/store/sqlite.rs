use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, SedimentError};
use crate::domain::{Frontier, Item, Partition, Platform, RedditPost, ReferencedTweet, Tweet};
use crate::store::{PartitionSummary, Store};

const POST_COLUMNS: &str = "post_id, partition_key, subreddit, title, author, created_utc, score,
     num_comments, url, selftext, permalink, retrieved_at";

const TWEET_COLUMNS: &str = "tweet_id, partition_key, text, author_id, author_username, author_name,
     author_verified, created_at, created_utc, lang, retweet_count, like_count, reply_count,
     quote_count, conversation_id, in_reply_to_user_id, hashtags, referenced_tweets, retrieved_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        // another ingester may hold the write lock briefly
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| SedimentError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            SedimentError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn table(platform: Platform) -> &'static str {
        match platform {
            Platform::Reddit => "posts",
            Platform::Twitter => "tweets",
        }
    }

    fn placeholders(n: usize) -> String {
        (1..=n)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn row_to_post(row: &Row<'_>) -> rusqlite::Result<RedditPost> {
        Ok(RedditPost {
            post_id: row.get(0)?,
            partition_key: row.get(1)?,
            subreddit: row.get(2)?,
            title: row.get(3)?,
            author: row.get(4)?,
            created_utc: row.get(5)?,
            score: row.get(6)?,
            num_comments: row.get(7)?,
            url: row.get(8)?,
            selftext: row.get(9)?,
            permalink: row.get(10)?,
            fetched_at: row
                .get::<_, String>(11)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn row_to_tweet(row: &Row<'_>) -> rusqlite::Result<Tweet> {
        let hashtags: String = row.get(16)?;
        let referenced: String = row.get(17)?;

        Ok(Tweet {
            tweet_id: row.get(0)?,
            partition_key: row.get(1)?,
            text: row.get(2)?,
            author_id: row.get(3)?,
            author_username: row.get(4)?,
            author_name: row.get(5)?,
            author_verified: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
            created_utc: row.get(8)?,
            lang: row.get(9)?,
            retweet_count: row.get(10)?,
            like_count: row.get(11)?,
            reply_count: row.get(12)?,
            quote_count: row.get(13)?,
            conversation_id: row.get(14)?,
            in_reply_to_user_id: row.get(15)?,
            hashtags: hashtags
                .split(',')
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            referenced_tweets: serde_json::from_str::<Vec<ReferencedTweet>>(&referenced)
                .unwrap_or_default(),
            fetched_at: row
                .get::<_, String>(18)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }
}

impl Store for SqliteStore {
    fn insert_if_absent(&self, item: &Item) -> Result<usize> {
        let conn = self.conn()?;

        let inserted = match item {
            Item::Post(p) => conn.execute(
                "INSERT INTO posts (post_id, partition_key, subreddit, title, author, created_utc,
                     score, num_comments, url, selftext, permalink, retrieved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(post_id) DO NOTHING",
                params![
                    p.post_id,
                    p.partition_key,
                    p.subreddit,
                    p.title,
                    p.author,
                    p.created_utc,
                    p.score,
                    p.num_comments,
                    p.url,
                    p.selftext,
                    p.permalink,
                    p.fetched_at.to_rfc3339()
                ],
            )?,
            Item::Message(t) => {
                let referenced = serde_json::to_string(&t.referenced_tweets)
                    .unwrap_or_else(|_| "[]".to_string());
                conn.execute(
                    "INSERT INTO tweets (tweet_id, tweet_seq, partition_key, text, author_id,
                         author_username, author_name, author_verified, created_at, created_utc,
                         lang, retweet_count, like_count, reply_count, quote_count,
                         conversation_id, in_reply_to_user_id, hashtags, referenced_tweets,
                         retrieved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20)
                     ON CONFLICT(tweet_id) DO NOTHING",
                    params![
                        t.tweet_id,
                        t.tweet_id.parse::<i64>().unwrap_or(0),
                        t.partition_key,
                        t.text,
                        t.author_id,
                        t.author_username,
                        t.author_name,
                        t.author_verified as i32,
                        t.created_at,
                        t.created_utc,
                        t.lang,
                        t.retweet_count,
                        t.like_count,
                        t.reply_count,
                        t.quote_count,
                        t.conversation_id,
                        t.in_reply_to_user_id,
                        t.hashtags.join(","),
                        referenced,
                        t.fetched_at.to_rfc3339()
                    ],
                )?
            }
        };

        Ok(inserted)
    }

    fn latest_frontiers(&self, partitions: &[Partition]) -> Result<HashMap<Partition, Frontier>> {
        let conn = self.conn()?;
        let mut frontiers = HashMap::new();

        for platform in Platform::ALL {
            let keys: Vec<&str> = partitions
                .iter()
                .filter(|p| p.platform == platform)
                .map(|p| p.key.as_str())
                .collect();
            if keys.is_empty() {
                continue;
            }

            let column = match platform {
                Platform::Reddit => "created_utc",
                Platform::Twitter => "tweet_seq",
            };
            let sql = format!(
                "SELECT partition_key, MAX({}) FROM {} WHERE partition_key IN ({}) GROUP BY partition_key",
                column,
                Self::table(platform),
                Self::placeholders(keys.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(keys.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            for row in rows {
                let (key, max) = row?;
                let frontier = match platform {
                    Platform::Reddit => Frontier::Timestamp(max),
                    Platform::Twitter => Frontier::Id(max.to_string()),
                };
                frontiers.insert(Partition { platform, key }, frontier);
            }
        }

        Ok(frontiers)
    }

    fn count_items(&self, platform: Platform) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", Self::table(platform)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn item_ids(&self, platform: Platform) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let column = match platform {
            Platform::Reddit => "post_id",
            Platform::Twitter => "tweet_id",
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {}",
            column,
            Self::table(platform)
        ))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;

        Ok(ids)
    }

    fn partition_summaries(&self, platform: Platform) -> Result<Vec<PartitionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT partition_key, COUNT(*), MIN(created_utc), MAX(created_utc)
             FROM {} GROUP BY partition_key ORDER BY partition_key",
            Self::table(platform)
        ))?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(PartitionSummary {
                    partition: Partition {
                        platform,
                        key: row.get(0)?,
                    },
                    count: row.get(1)?,
                    earliest: row
                        .get::<_, Option<i64>>(2)?
                        .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                    latest: row
                        .get::<_, Option<i64>>(3)?
                        .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    fn get_item(&self, platform: Platform, id: &str) -> Result<Option<Item>> {
        let conn = self.conn()?;

        let item = match platform {
            Platform::Reddit => conn
                .query_row(
                    &format!("SELECT {} FROM posts WHERE post_id = ?1", POST_COLUMNS),
                    params![id],
                    Self::row_to_post,
                )
                .optional()?
                .map(Item::Post),
            Platform::Twitter => conn
                .query_row(
                    &format!("SELECT {} FROM tweets WHERE tweet_id = ?1", TWEET_COLUMNS),
                    params![id],
                    Self::row_to_tweet,
                )
                .optional()?
                .map(Item::Message),
        };

        Ok(item)
    }
}
