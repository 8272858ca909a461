//! End-to-end ingestion flow tests
//!
//! Drives the full pipeline — decode, subscription expansion, batched
//! persistence — against in-memory fakes, the way the delivery loop
//! drives it in production.
//!
//! Covered:
//! - First index tick triggers one strike-window expansion
//! - Decoded ticks land in the store with the right topic metadata
//! - Size-triggered flushes happen without waiting for shutdown
//! - Malformed payloads are contained and do not stall the flow

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;

use tick_ingestor::batch::BatcherConfig;
use tick_ingestor::metrics::PipelineMetrics;
use tick_ingestor::pipeline::Pipeline;
use tick_ingestor::resolver::{ResolveError, TokenResolver};
use tick_ingestor::store::{StoreError, TickRow, TickStore};
use tick_ingestor::subscriptions::{SubscriptionConfig, SubscriptionManager};
use tick_ingestor::transport::{Transport, TransportError};
use tick_ingestor::wire::MarketData;
use tick_ingestor::writer;
use types::topic::{OptionType, TopicMeta};

/// Transport fake recording each subscribe call.
#[derive(Default)]
struct RecordingTransport {
    subscribed: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.subscribed.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}

/// Resolver fake that resolves every leg and counts lookups.
#[derive(Default)]
struct AlwaysResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenResolver for AlwaysResolver {
    async fn resolve(
        &self,
        index_name: &str,
        _expiry: &str,
        strike: i64,
        option_type: OptionType,
    ) -> Result<Option<String>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("{index_name}-{strike}-{option_type}")))
    }
}

/// Store fake assigning sequential topic ids and keeping every row.
#[derive(Default)]
struct MemoryStore {
    topics: Mutex<Vec<TopicMeta>>,
    rows: Mutex<Vec<TickRow>>,
}

impl MemoryStore {
    fn rows(&self) -> Vec<TickRow> {
        self.rows.lock().unwrap().clone()
    }

    fn topics(&self) -> Vec<TopicMeta> {
        self.topics.lock().unwrap().clone()
    }
}

#[async_trait]
impl TickStore for MemoryStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn resolve_topic_id(&self, meta: &TopicMeta) -> Result<i64, StoreError> {
        let mut topics = self.topics.lock().unwrap();
        if let Some(pos) = topics.iter().position(|t| t.name == meta.name) {
            return Ok(pos as i64 + 1);
        }
        topics.push(meta.clone());
        Ok(topics.len() as i64)
    }

    async fn insert_ticks(&self, rows: &[TickRow]) -> Result<u64, StoreError> {
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }
}

struct Harness {
    pipeline: Pipeline,
    transport: Arc<RecordingTransport>,
    resolver: Arc<AlwaysResolver>,
    store: Arc<MemoryStore>,
    metrics: Arc<PipelineMetrics>,
    writer: writer::BatchWriterHandle,
}

/// One-index setup with a small strike radius so the expected
/// subscription set stays countable by hand.
fn make_harness(batch_size: usize) -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let resolver = Arc::new(AlwaysResolver::default());
    let store = Arc::new(MemoryStore::default());
    let metrics = Arc::new(PipelineMetrics::new());

    let writer = writer::spawn(
        store.clone(),
        BatcherConfig {
            max_size: batch_size,
            max_wait: Duration::from_secs(5),
        },
        metrics.clone(),
    );

    let subscriptions = SubscriptionManager::new(
        SubscriptionConfig {
            topic_prefix: "index".to_string(),
            indices: vec!["NIFTY".to_string()],
            expiries: HashMap::from([("NIFTY".to_string(), "22-05-2025".to_string())]),
            strike_radius: 2,
        },
        transport.clone(),
        resolver.clone(),
        metrics.clone(),
    );

    let pipeline = Pipeline::new(subscriptions, writer.clone(), metrics.clone());

    Harness {
        pipeline,
        transport,
        resolver,
        store,
        metrics,
        writer,
    }
}

fn proto_payload(ltp: f64, ts_millis: Option<i64>) -> Vec<u8> {
    MarketData { ltp, ts: ts_millis }.encode_to_vec()
}

/// Give the writer task a chance to drain its channel.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_index_tick_expands_strike_window() {
    let mut h = make_harness(100);

    h.pipeline.on_connected().await;
    h.pipeline
        .handle_message("index/NIFTY", &proto_payload(19987.0, Some(1_700_000_000_000)))
        .await;

    // Radius 2 is five strikes, two legs each.
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 10);
    assert_eq!(
        h.pipeline.subscriptions().is_awaiting_first("NIFTY"),
        Some(false)
    );
    assert_eq!(h.pipeline.subscriptions().last_price("NIFTY"), Some(19987.0));

    // ATM for 19987 at increment 50 is 20000; both boundary legs of
    // the window must be subscribed.
    let subscribed = h.transport.subscribed.lock().unwrap().clone();
    assert!(subscribed.contains(&"index/NIFTY".to_string()));
    assert!(subscribed.contains(&"index/+/+/+/+".to_string()));
    assert!(subscribed.contains(&"index/NIFTY/22-05-2025/19900/ce".to_string()));
    assert!(subscribed.contains(&"index/NIFTY/22-05-2025/20100/pe".to_string()));

    h.writer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_index_tick_does_not_reexpand() {
    let mut h = make_harness(100);

    h.pipeline.on_connected().await;
    h.pipeline
        .handle_message("index/NIFTY", &proto_payload(19987.0, None))
        .await;
    h.pipeline
        .handle_message("index/NIFTY", &proto_payload(20140.0, None))
        .await;

    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 10);
    // Last price still tracks even though no expansion re-runs.
    assert_eq!(h.pipeline.subscriptions().last_price("NIFTY"), Some(20140.0));

    h.writer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ticks_persist_with_topic_metadata() {
    let mut h = make_harness(100);

    h.pipeline.on_connected().await;
    h.pipeline
        .handle_message("index/NIFTY", &proto_payload(19987.0, Some(1_700_000_000_000)))
        .await;
    h.pipeline
        .handle_message(
            "index/NIFTY/22-05-2025/20000/ce",
            br#"{"ltp": 123.45, "timestamp": 1700000001000}"#,
        )
        .await;

    h.writer.shutdown().await;
    settle().await;

    let rows = h.store.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].price, 19987.0);
    assert_eq!(rows[1].price, 123.45);

    let topics = h.store.topics();
    assert_eq!(topics.len(), 2);

    let spot = &topics[0];
    assert_eq!(spot.name, "index/NIFTY");
    assert_eq!(spot.index_name.as_deref(), Some("NIFTY"));
    assert_eq!(spot.contract_type.as_deref(), Some("index"));
    assert_eq!(spot.strike, None);

    let call = &topics[1];
    assert_eq!(call.name, "index/NIFTY/22-05-2025/20000/ce");
    assert_eq!(call.index_name.as_deref(), Some("NIFTY"));
    assert_eq!(call.contract_type.as_deref(), Some("ce"));
    assert_eq!(call.strike, Some(20000.0));
    assert_eq!(call.expiry.as_deref(), Some("22-05-2025"));
}

#[tokio::test(start_paused = true)]
async fn test_size_trigger_flushes_before_shutdown() {
    let mut h = make_harness(2);

    h.pipeline.on_connected().await;
    h.pipeline
        .handle_message("index/NIFTY", &proto_payload(19987.0, None))
        .await;
    h.pipeline
        .handle_message("index/NIFTY", &proto_payload(19990.0, None))
        .await;
    settle().await;

    // Both rows flushed by batch size, no shutdown involved.
    assert_eq!(h.store.rows().len(), 2);
    assert_eq!(h.metrics.batches_flushed.load(Ordering::SeqCst), 1);

    h.writer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_is_contained() {
    let mut h = make_harness(100);

    h.pipeline.on_connected().await;
    h.pipeline
        .handle_message("index/NIFTY", br#"{"unrelated": true}"#)
        .await;
    assert_eq!(h.metrics.decode_failures.load(Ordering::SeqCst), 1);

    // The flow keeps working after the bad message.
    h.pipeline
        .handle_message("index/NIFTY", &proto_payload(19987.0, None))
        .await;
    h.writer.shutdown().await;
    settle().await;

    assert_eq!(h.store.rows().len(), 1);
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_topic_still_persists() {
    let mut h = make_harness(100);

    h.pipeline
        .handle_message("weird/namespace/tick", &proto_payload(1.5, None))
        .await;
    h.writer.shutdown().await;
    settle().await;

    let topics = h.store.topics();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].name, "weird/namespace/tick");
    assert_eq!(topics[0].index_name, None);
    assert_eq!(h.store.rows().len(), 1);
}
