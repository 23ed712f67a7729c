//! # Sediment
//!
//! Incremental ingestion and historical backfill of Reddit posts and X
//! (Twitter) tweets into a local SQLite store.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → Source → Normalizer → Paginator → Committer → Store
//! ```
//!
//! Every subreddit or hashtag group is a [`Partition`](domain::Partition)
//! tracked independently. Ongoing polling only walks the `Latest` listing
//! down to each partition's frontier; backfill walks several strategies
//! (`top` all time, `top` by period, `hot`) under a per-step budget and
//! relies on idempotent inserts to absorb the overlap.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write ~/.config/sediment/config.toml
//! sediment init-config
//!
//! # One polling cycle per enabled platform
//! sediment sync
//!
//! # Historical backfill of a subreddit
//! sediment backfill samsung --budget 1000
//!
//! # Continuous polling
//! sediment daemon start
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires the store and one rate-governed
/// source per enabled platform.
pub mod app;

/// Command-line interface using clap.
///
/// - `sync` - one cycle per platform
/// - `backfill <target>` - multi-strategy historical fetch
/// - `stats` - per-partition counts and time ranges
/// - `check` - connectivity probe
/// - `init-config` - write the default config file
/// - `daemon start|stop|status`
pub mod cli;

/// TOML configuration with environment overrides.
///
/// Loads from `~/.config/sediment/config.toml`, creating a commented
/// default on first run.
pub mod config;

/// Foreground polling daemon with a PID file and signal handling.
pub mod daemon;

/// Core domain models: platforms, partitions, frontiers, strategies, items.
pub mod domain;

/// HTTP transport.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait returning raw bodies
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// Converts Reddit listings and X search responses into [`Item`](domain::Item)s.
pub mod normalizer;

/// Platform adapters mapping a strategy and cursor to a request.
pub mod source;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): trait defining storage operations
/// - [`SqliteStore`](store::sqlite::SqliteStore): SQLite implementation
pub mod store;

/// Pagination, rate governing, commit, backfill and polling cycles.
pub mod sync;
