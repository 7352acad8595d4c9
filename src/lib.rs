//! Resilient Upstream Proxy
//!
//! A single façade in front of many independent backend services that must
//! stay responsive even when an upstream is slow, flapping, or down.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────┐
//!                 │                 RESILIENT PROXY                     │
//!                 │                                                     │
//!  Client Request │  ┌────────┐   ┌──────────┐   ┌───────────────┐     │
//!  ───────────────┼─▶│  http  │──▶│  proxy   │──▶│  cache store  │     │
//!                 │  │ server │   │ service  │   │  (TTL read)   │     │
//!                 │  └────────┘   └────┬─────┘   └───────┬───────┘     │
//!                 │                    │ miss            │ hit         │
//!                 │                    ▼                 │             │
//!                 │            ┌──────────────┐          │             │
//!                 │            │  coalescer   │          │             │
//!                 │            └──────┬───────┘          │             │
//!                 │                   ▼                  │             │
//!                 │            ┌──────────────┐          │             │
//!                 │            │   circuit    │          │             │
//!                 │            │   breaker    │          │             │
//!                 │            └──────┬───────┘          │             │
//!                 │                   ▼                  │             │
//!  Client Response│            ┌──────────────┐          │             │
//!  ◀──────────────┼────────────│ retry + HTTP │◀─────────┘             │
//!                 │            │    client    │────────▶ Upstream      │
//!                 │            └──────────────┘                        │
//!                 │                                                     │
//!                 │  ┌────────────────────────────────────────────────┐ │
//!                 │  │            Cross-Cutting Concerns              │ │
//!                 │  │  config │ observability │ lifecycle            │ │
//!                 │  └────────────────────────────────────────────────┘ │
//!                 └────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod proxy;
pub mod resilience;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{ProxyError, ProxyRequest, ProxyResult, ProxyService};
