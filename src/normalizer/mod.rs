mod reddit;
mod twitter;

use crate::app::Result;
use crate::domain::{Item, Partition, Platform};

/// One upstream page converted to canonical items.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub items: Vec<Item>,
    /// Opaque token for the next page; `None` when upstream has no more.
    pub next_cursor: Option<String>,
}

/// Converts platform JSON bodies into [`Item`]s tagged with the partition
/// they were fetched for.
#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, partition: &Partition, body: &[u8]) -> Result<Listing> {
        match partition.platform {
            Platform::Reddit => reddit::parse_listing(&partition.key, body),
            Platform::Twitter => twitter::parse_search(&partition.key, body),
        }
    }
}
