//! HTTP surface subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (router, request-id / trace / timeout layers)
//!     → handlers.rs (extract params, call ProxyService)
//!     → JSON response (errors via ProxyError::into_response)
//! ```
//!
//! # Design Decisions
//! - Handlers hold no state beyond the injected ProxyService
//! - Response metadata surfaces as X-Cache-Status / X-Circuit-State /
//!   X-Retry-Attempts (plus X-Cache-Age on hits) headers on the fetch path
//! - JSON field names are camelCase on the wire

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
