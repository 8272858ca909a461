//! Types library for the tick ingestion pipeline
//!
//! This library provides the core type definitions shared across the
//! ingestion service: decoded price ticks, topic parsing for the two
//! pub/sub namespaces, and the durable topic identity attributes.
//!
//! # Modules
//! - `tick`: decoded price observations (`Tick`, `TickKind`)
//! - `topic`: topic namespace parsing and formatting (`Topic`,
//!   `OptionType`, `TopicMeta`)

// Public modules
pub mod tick;
pub mod topic;

// Library version constant
pub const LIB_VERSION: &str = "0.1.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::tick::*;
    pub use crate::topic::*;
}
