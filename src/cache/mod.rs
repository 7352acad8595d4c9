//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound URL
//!     → key.rs (normalize: lowercase scheme/host, sorted query)
//!     → store.rs (TTL lookup)
//!         hit   → serve cached body, zero upstream calls
//!         miss  → fetch path; successful responses written back
//! ```
//!
//! # Design Decisions
//! - Expired entries are misses but stay countable until swept
//! - noCache bypasses the read, never the write
//! - Two semantically identical URLs share one entry

pub mod key;
pub mod store;

pub use key::normalize_key;
pub use store::{CacheStats, CacheStore, CachedBody};
