//! Protobuf wire shapes for market-data payloads
//!
//! Hand-declared prost messages; the feed does not publish a schema
//! registry, so the two known shapes are pinned here. Field 1 of
//! `MarketData` is a double and field 1 of `MarketDataBatch` is a
//! length-delimited repeated message, so a payload of one shape fails
//! wire-type validation when decoded as the other — the decode sniff
//! relies on that.

/// A single last-traded-price observation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarketData {
    /// Last traded price.
    #[prost(double, tag = "1")]
    pub ltp: f64,
    /// Exchange timestamp, Unix milliseconds.
    #[prost(int64, optional, tag = "2")]
    pub ts: ::core::option::Option<i64>,
}

/// A batch of observations published in one payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarketDataBatch {
    #[prost(message, repeated, tag = "1")]
    pub data: ::prost::alloc::vec::Vec<MarketData>,
}
