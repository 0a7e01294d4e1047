//! # Cache Module
//!
//! Time-to-live cache used to front the upstream content API.
//!
//! The upstream API is rate limited and slow compared to an in-memory read,
//! and most of what it serves (verse text, catalogs, audio descriptors) does
//! not change on the timescale of a day. Every content operation therefore
//! goes through a [`TtlCache`] before touching the network.
//!
//! ## Features
//!
//! - **Per-entry TTL**: each `set` carries its own lifetime, falling back to
//!   a store-wide default (24 hours)
//! - **Lazy expiry**: a read past `expires_at` behaves as a miss and drops
//!   the entry
//! - **Background sweep**: a cancellable tokio task prunes expired entries
//!   every 10 minutes so memory stays bounded under low read traffic
//! - **Thread Safety**: sharded [`dashmap::DashMap`], no global lock
//! - **Injectable clock**: tests drive expiry through [`ManualClock`]
//!
//! No LRU or size eviction. Callers own the key space.
//!
//! ## Configuration
//!
//! ```env
//! CACHE_DEFAULT_TTL_SECS=86400     # TTL for entries stored without one
//! CACHE_SWEEP_INTERVAL_SECS=600    # Background sweep period
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use quran_gateway::cache::TtlCache;
//! use std::time::Duration;
//!
//! let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(86_400));
//! cache.set("verse_of_day", "2:255".to_string(), Some(Duration::from_secs(60)));
//!
//! if let Some(key) = cache.get("verse_of_day") {
//!     println!("cached verse: {key}");
//! }
//! ```

pub mod clock;
pub mod ttl_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ttl_cache::{CacheStats, TtlCache, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL, MAX_TTL};
