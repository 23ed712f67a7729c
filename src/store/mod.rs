pub mod sqlite;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Frontier, Item, Partition, Platform};

pub use sqlite::SqliteStore;

/// Per-partition coverage, as shown by `sediment stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSummary {
    pub partition: Partition,
    pub count: i64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

pub trait Store: Send + Sync {
    /// Insert keyed on the item's id; returns rows affected (0 when the id
    /// is already stored).
    fn insert_if_absent(&self, item: &Item) -> Result<usize>;

    /// Newest stored marker for each partition, in one query per platform.
    /// Partitions without items are absent from the map.
    fn latest_frontiers(&self, partitions: &[Partition]) -> Result<HashMap<Partition, Frontier>>;

    fn count_items(&self, platform: Platform) -> Result<i64>;

    /// Every stored id for a platform, used to seed the session dedup set.
    fn item_ids(&self, platform: Platform) -> Result<HashSet<String>>;

    fn partition_summaries(&self, platform: Platform) -> Result<Vec<PartitionSummary>>;

    fn get_item(&self, platform: Platform, id: &str) -> Result<Option<Item>>;
}
