pub mod item;
pub mod partition;
pub mod stats;
pub mod strategy;

pub use item::{Item, RedditPost, ReferencedTweet, Tweet};
pub use partition::{compare_ids, Frontier, Partition, Platform};
pub use stats::SyncStats;
pub use strategy::{default_plan, Period, PlanStep, Strategy};
