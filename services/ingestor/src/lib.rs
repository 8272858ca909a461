//! Tick Ingestion Service
//!
//! Consumes derivatives market-data messages from a pub/sub transport
//! and produces:
//! - Decoded price ticks from a small set of wire shapes
//! - Dynamic option subscriptions around the at-the-money strike
//! - Batched, transactional persistence with a topic-id cache
//!
//! # Architecture
//!
//! ```text
//! Transport (topic, bytes)
//!        │
//!    ┌───▼───┐
//!    │Decoder│  ← protobuf single / protobuf batch / JSON fallback
//!    └───┬───┘
//!        │ ticks
//!   ┌────┴──────────────┐
//!   │ index topic?      │
//! ┌─▼────────────┐  ┌───▼────────┐
//! │Subscription  │  │            │
//! │Manager       │  │            │
//! │ (ATM window, │  │            │
//! │  resolve,    │  │            │
//! │  subscribe)  │  │            │
//! └─┬────────────┘  │            │
//!   │ index tick    │ option tick│
//! ┌─▼───────────────▼────────────▼──┐
//! │     BatchWriter (size/time)     │
//! │  topic-id cache → transactional │
//! │  insert into the tick store     │
//! └─────────────────────────────────┘
//! ```
//!
//! No per-message error is fatal: decode failures, resolution
//! failures, unknown indices, and flush failures are logged, counted,
//! and contained to the message or batch that caused them.

pub mod batch;
pub mod codec;
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod resolver;
pub mod store;
pub mod subscriptions;
pub mod topology;
pub mod transport;
pub mod wire;
pub mod writer;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
