use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::{Frontier, Platform};

/// Session counters for one platform. Monotonic for the life of a run.
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub platform: Platform,
    pub cycles: u64,
    pub items_fetched: u64,
    pub items_stored: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub rate_limit_hits: u64,
    pub started_at: DateTime<Utc>,
    pub last_fetch_at: Option<DateTime<Utc>>,
    /// Newest item stored this session; never moves backward.
    pub latest_marker: Frontier,
}

impl SyncStats {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            cycles: 0,
            items_fetched: 0,
            items_stored: 0,
            duplicates: 0,
            errors: 0,
            rate_limit_hits: 0,
            started_at: Utc::now(),
            last_fetch_at: None,
            latest_marker: Frontier::Empty,
        }
    }

    pub fn record_fetch(&mut self, fetched: usize) {
        self.items_fetched += fetched as u64;
        self.last_fetch_at = Some(Utc::now());
    }

    pub fn record_stored(&mut self, marker: Frontier) {
        self.items_stored += 1;
        if marker.is_newer_than(&self.latest_marker) {
            self.latest_marker = marker;
        }
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_rate_limit(&mut self) {
        self.rate_limit_hits += 1;
    }

    pub fn record_cycle(&mut self) {
        self.cycles += 1;
    }

    pub fn runtime_secs(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0)
    }

    pub fn items_per_minute(&self) -> f64 {
        let minutes = self.runtime_secs() as f64 / 60.0;
        if minutes > 0.0 {
            self.items_fetched as f64 / minutes
        } else {
            0.0
        }
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: runtime={}s cycles={} fetched={} stored={} duplicates={} errors={} rate_limit_hits={} latest={} ipm={:.1}",
            self.platform,
            self.runtime_secs(),
            self.cycles,
            self.items_fetched,
            self.items_stored,
            self.duplicates,
            self.errors,
            self.rate_limit_hits,
            self.latest_marker,
            self.items_per_minute()
        )
    }
}
