//! Multi-shape payload decoding
//!
//! The feed is not a tagged protocol: publishers emit either a single
//! protobuf `MarketData`, a protobuf `MarketDataBatch`, or plain JSON.
//! Decoding tries each shape in that fixed priority order and the
//! first one that parses without structural error wins. Ambiguous
//! payloads take the earliest-listed interpretation.
//!
//! Non-finite prices inside an otherwise valid payload are dropped and
//! counted, never fatal. A payload with no parseable shape, or whose
//! valid shape yields zero finite prices, fails with `DecodeError` and
//! the caller drops it.

use chrono::{DateTime, TimeZone, Utc};
use prost::Message;
use tracing::debug;

use crate::wire::{MarketData, MarketDataBatch};

/// Errors produced while decoding one payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload matched no known wire shape ({len} bytes)")]
    UnknownShape { len: usize },

    #[error("payload decoded but contained no finite price")]
    NoValidPrices,
}

/// One decoded price with its optional exchange timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedPrice {
    pub price: f64,
    pub received_at: Option<DateTime<Utc>>,
}

/// Result of decoding one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Finite prices, in payload order.
    pub prices: Vec<DecodedPrice>,
    /// Prices dropped for being non-finite or missing.
    pub non_finite_dropped: usize,
    /// Which wire shape won the sniff, for logging.
    pub shape: WireShape,
}

/// The wire shapes tried, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    ProtoSingle,
    ProtoBatch,
    Json,
}

impl WireShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireShape::ProtoSingle => "proto_single",
            WireShape::ProtoBatch => "proto_batch",
            WireShape::Json => "json",
        }
    }
}

/// Decode one payload into finite prices.
///
/// `topic` is only used for logging context; classification of the
/// tick happens in the pipeline.
pub fn decode(topic: &str, payload: &[u8]) -> Result<Decoded, DecodeError> {
    if let Ok(msg) = MarketData::decode(payload) {
        return finish(topic, WireShape::ProtoSingle, collect_single(&msg));
    }

    if let Ok(msg) = MarketDataBatch::decode(payload) {
        let mut prices = Vec::with_capacity(msg.data.len());
        let mut dropped = 0usize;
        for item in &msg.data {
            let (mut p, d) = collect_single(item);
            prices.append(&mut p);
            dropped += d;
        }
        return finish_counts(topic, WireShape::ProtoBatch, prices, dropped);
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
        return finish(topic, WireShape::Json, collect_json(&value));
    }

    Err(DecodeError::UnknownShape {
        len: payload.len(),
    })
}

fn finish(
    topic: &str,
    shape: WireShape,
    (prices, dropped): (Vec<DecodedPrice>, usize),
) -> Result<Decoded, DecodeError> {
    finish_counts(topic, shape, prices, dropped)
}

fn finish_counts(
    topic: &str,
    shape: WireShape,
    prices: Vec<DecodedPrice>,
    non_finite_dropped: usize,
) -> Result<Decoded, DecodeError> {
    if prices.is_empty() {
        return Err(DecodeError::NoValidPrices);
    }
    debug!(
        topic,
        shape = shape.as_str(),
        prices = prices.len(),
        dropped = non_finite_dropped,
        "Payload decoded"
    );
    Ok(Decoded {
        prices,
        non_finite_dropped,
        shape,
    })
}

fn collect_single(msg: &MarketData) -> (Vec<DecodedPrice>, usize) {
    if msg.ltp.is_finite() {
        (
            vec![DecodedPrice {
                price: msg.ltp,
                received_at: msg.ts.and_then(millis_to_utc),
            }],
            0,
        )
    } else {
        (Vec::new(), 1)
    }
}

/// Walk a JSON value the way the feed publishes it: either
/// `{"data": [{"ltp": ...}, ...]}` or `{"ltp": ..., "timestamp": ...}`.
///
/// Walked manually instead of via serde structs so one malformed
/// element drops only itself, not the whole batch.
fn collect_json(value: &serde_json::Value) -> (Vec<DecodedPrice>, usize) {
    if let Some(items) = value.get("data").and_then(|d| d.as_array()) {
        let mut prices = Vec::with_capacity(items.len());
        let mut dropped = 0usize;
        for item in items {
            match json_price(item) {
                Some(p) => prices.push(p),
                None => dropped += 1,
            }
        }
        return (prices, dropped);
    }

    if value.get("ltp").is_some() {
        return match json_price(value) {
            Some(p) => (vec![p], 0),
            None => (Vec::new(), 1),
        };
    }

    (Vec::new(), 0)
}

fn json_price(item: &serde_json::Value) -> Option<DecodedPrice> {
    let price = item.get("ltp")?.as_f64().filter(|p| p.is_finite())?;
    let received_at = item
        .get("timestamp")
        .and_then(|t| t.as_i64())
        .and_then(millis_to_utc);
    Some(DecodedPrice {
        price,
        received_at,
    })
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
