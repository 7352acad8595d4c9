//! Proxy core subsystem.
//!
//! # Data Flow
//! ```text
//! fetch_cached(request):
//!     cache read (unless noCache)
//!         hit  → ProxyResult { fromCache: true, attempts: 0 }
//!         miss → coalesce.rs (join or own the in-flight fetch)
//!             → circuit check (fail fast when open)
//!             → retry-executed upstream fetch
//!             → record outcome, write cache on success
//!
//! execute(request):
//!     same circuit + retry path, never touches the cache
//! ```
//!
//! # Design Decisions
//! - All mutable state lives in one ProxyService, injected into handlers
//! - Coalesced callers share one upstream call and one result
//! - Error taxonomy is a closed enum so handling is exhaustiveness-checked

pub mod coalesce;
pub mod error;
pub mod service;
pub mod types;

pub use error::{ErrorKind, ProxyError};
pub use service::{HealthReport, ProxyService, StatsReport};
pub use types::{ProxyRequest, ProxyResult};
