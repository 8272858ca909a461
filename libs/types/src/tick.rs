//! Decoded price observations
//!
//! A `Tick` is one decoded price for an index or option contract.
//! Ticks are immutable once produced by the decoder; the batch writer
//! consumes each tick exactly once and does not retain it after a
//! successful flush.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a tick belongs to an index spot stream or an option leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickKind {
    Index,
    Option,
}

impl TickKind {
    /// Label used for logging and the `topics.contract_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TickKind::Index => "index",
            TickKind::Option => "option",
        }
    }
}

/// One decoded price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Topic the payload arrived on.
    pub topic: String,
    /// Last traded price. Always finite — the decoder drops the rest.
    pub price: f64,
    /// Exchange timestamp if the wire shape carried one.
    pub received_at: Option<DateTime<Utc>>,
    /// Index this tick belongs to, when known.
    pub index_name: Option<String>,
    pub kind: TickKind,
    /// Strike price for option ticks.
    pub strike: Option<f64>,
}

impl Tick {
    /// Tick for an index spot topic.
    pub fn index(topic: &str, index_name: &str, price: f64) -> Self {
        Self {
            topic: topic.to_string(),
            price,
            received_at: None,
            index_name: Some(index_name.to_string()),
            kind: TickKind::Index,
            strike: None,
        }
    }

    /// Tick for an option contract leg.
    pub fn option(topic: &str, index_name: &str, price: f64, strike: f64) -> Self {
        Self {
            topic: topic.to_string(),
            price,
            received_at: None,
            index_name: Some(index_name.to_string()),
            kind: TickKind::Option,
            strike: Some(strike),
        }
    }

    /// Tick for a topic outside the known namespaces.
    pub fn bare(topic: &str, price: f64) -> Self {
        Self {
            topic: topic.to_string(),
            price,
            received_at: None,
            index_name: None,
            kind: TickKind::Option,
            strike: None,
        }
    }

    /// Attach the exchange timestamp decoded from the payload.
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }
}
