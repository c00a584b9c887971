//! PDF Markup Cache Library
//!
//! Durable per-document byte cache with TTL-based freshness, upstream
//! timestamp validation and collapsing of concurrent fetches.

pub mod clock;
pub mod config;
pub mod disk;
pub mod flight;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, ConfigError};
pub use disk::{CacheCorruption, CacheEntry, CacheError, CacheStats, PersistentCache};
pub use flight::InFlight;
