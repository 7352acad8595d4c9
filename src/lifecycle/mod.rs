//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup: load config → validate → init observability → bind → serve
//! Shutdown: Ctrl+C or trigger() → server drains → sweeper exits
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the shutdown signal out to every task
//! - All state (cache, circuits) is in-memory and does not survive a restart

pub mod shutdown;

pub use shutdown::Shutdown;
