//! Pipeline coordinator
//!
//! Wires one delivered (topic, payload) pair through decode →
//! subscription state → batched persistence. All per-message failures
//! are contained here: a malformed payload, an unconfigured index, or
//! an unresolvable leg never interrupts the delivery loop.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use types::tick::Tick;
use types::topic::Topic;

use crate::codec;
use crate::metrics::PipelineMetrics;
use crate::subscriptions::SubscriptionManager;
use crate::writer::BatchWriterHandle;

/// Coordinates the three pipeline stages for every delivered message.
pub struct Pipeline {
    subscriptions: SubscriptionManager,
    writer: BatchWriterHandle,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(
        subscriptions: SubscriptionManager,
        writer: BatchWriterHandle,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            subscriptions,
            writer,
            metrics,
        }
    }

    /// Handle a broker (re)connect: re-issue the configured index
    /// subscriptions and the option wildcard. Idempotent.
    pub async fn on_connected(&mut self) {
        self.subscriptions.subscribe_configured_indices().await;
        self.subscriptions.subscribe_option_wildcard().await;
    }

    /// Process one delivered message end to end.
    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        self.metrics.incr(&self.metrics.messages_received);

        let decoded = match codec::decode(topic, payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(topic, error = %err, "Dropping undecodable payload");
                self.metrics.incr(&self.metrics.decode_failures);
                return;
            }
        };
        self.metrics
            .add(&self.metrics.ticks_decoded, decoded.prices.len() as u64);
        self.metrics.add(
            &self.metrics.non_finite_dropped,
            decoded.non_finite_dropped as u64,
        );

        let parsed = Topic::parse(topic);
        for price in decoded.prices {
            // Arrival time stands in when the payload carried none, so
            // the (topic, received_at) dedup key is always populated.
            let received_at = price.received_at.unwrap_or_else(Utc::now);

            let tick = match &parsed {
                Topic::Index { index_name } => {
                    self.subscriptions
                        .on_index_tick(index_name, price.price)
                        .await;
                    Tick::index(topic, index_name, price.price)
                }
                Topic::OptionContract {
                    index_name, strike, ..
                } => Tick::option(topic, index_name, price.price, *strike),
                Topic::Unknown => {
                    debug!(topic, "Topic outside known namespaces — persisting as-is");
                    Tick::bare(topic, price.price)
                }
            }
            .with_received_at(received_at);

            self.writer.enqueue(tick);
        }
    }

    /// The subscription state, exposed for the delivery loop and tests.
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatcherConfig;
    use crate::resolver::{ResolveError, TokenResolver};
    use crate::store::{StoreError, TickRow, TickStore};
    use crate::subscriptions::SubscriptionConfig;
    use crate::transport::{Transport, TransportError};
    use crate::wire::MarketData;
    use crate::writer;
    use async_trait::async_trait;
    use prost::Message;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use types::topic::{OptionType, TopicMeta};

    #[derive(Default)]
    struct NullTransport {
        subscribed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for NullTransport {
        async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
            self.subscribed.lock().unwrap().push(topic.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingResolver {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TokenResolver for CountingResolver {
        async fn resolve(
            &self,
            index_name: &str,
            _expiry: &str,
            strike: i64,
            option_type: OptionType,
        ) -> Result<Option<String>, ResolveError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("{}{}{}", index_name, strike, option_type)))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<TickRow>>,
        ids: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl TickStore for MemoryStore {
        async fn init_schema(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn resolve_topic_id(&self, meta: &TopicMeta) -> Result<i64, StoreError> {
            let mut ids = self.ids.lock().unwrap();
            let next = ids.len() as i64 + 1;
            Ok(*ids.entry(meta.name.clone()).or_insert(next))
        }

        async fn insert_ticks(&self, rows: &[TickRow]) -> Result<u64, StoreError> {
            self.rows.lock().unwrap().extend_from_slice(rows);
            Ok(rows.len() as u64)
        }
    }

    struct Fixture {
        pipeline: Pipeline,
        transport: Arc<NullTransport>,
        resolver: Arc<CountingResolver>,
        store: Arc<MemoryStore>,
        metrics: Arc<PipelineMetrics>,
    }

    fn make_pipeline() -> Fixture {
        let transport = Arc::new(NullTransport::default());
        let resolver = Arc::new(CountingResolver::default());
        let store = Arc::new(MemoryStore::default());
        let metrics = Arc::new(PipelineMetrics::new());

        let mut expiries = HashMap::new();
        expiries.insert("NIFTY".to_string(), "22-05-2025".to_string());
        let subscriptions = SubscriptionManager::new(
            SubscriptionConfig {
                topic_prefix: "index".to_string(),
                indices: vec!["NIFTY".to_string()],
                expiries,
                strike_radius: 1,
            },
            transport.clone(),
            resolver.clone(),
            metrics.clone(),
        );

        let handle = writer::spawn(
            store.clone(),
            BatcherConfig {
                max_size: 100,
                max_wait: Duration::from_secs(5),
            },
            metrics.clone(),
        );

        Fixture {
            pipeline: Pipeline::new(subscriptions, handle, metrics.clone()),
            transport,
            resolver,
            store,
            metrics,
        }
    }

    fn single_payload(ltp: f64) -> Vec<u8> {
        MarketData {
            ltp,
            ts: Some(1_747_900_800_000),
        }
        .encode_to_vec()
    }

    #[tokio::test]
    async fn test_index_tick_expands_and_enqueues() {
        let mut fx = make_pipeline();

        fx.pipeline
            .handle_message("index/NIFTY", &single_payload(19987.0))
            .await;

        // radius 1 → 2 * 3 legs
        assert_eq!(fx.resolver.attempts.load(Ordering::SeqCst), 6);
        assert_eq!(fx.pipeline.subscriptions().active_subscriptions().len(), 6);
        assert_eq!(fx.metrics.export()["ticks_enqueued"], 1);
    }

    #[tokio::test]
    async fn test_option_tick_skips_expansion() {
        let mut fx = make_pipeline();

        fx.pipeline
            .handle_message("index/NIFTY/22-05-2025/20000/ce", &single_payload(142.5))
            .await;

        assert_eq!(fx.resolver.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(fx.metrics.export()["ticks_enqueued"], 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_contained() {
        let mut fx = make_pipeline();

        fx.pipeline
            .handle_message("index/NIFTY", &[0xff, 0xff])
            .await;

        assert_eq!(fx.metrics.export()["decode_failures"], 1);
        assert_eq!(fx.metrics.export()["ticks_enqueued"], 0);

        // The loop keeps working after the bad payload.
        fx.pipeline
            .handle_message("index/NIFTY", &single_payload(19987.0))
            .await;
        assert_eq!(fx.metrics.export()["ticks_enqueued"], 1);
    }

    #[tokio::test]
    async fn test_unknown_namespace_still_persisted() {
        let mut fx = make_pipeline();

        fx.pipeline
            .handle_message("telemetry/node/heartbeat", &single_payload(1.0))
            .await;

        assert_eq!(fx.metrics.export()["ticks_enqueued"], 1);
        assert_eq!(fx.resolver.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_on_connected_subscribes_indices_and_wildcard() {
        let mut fx = make_pipeline();

        fx.pipeline.on_connected().await;
        fx.pipeline.on_connected().await;

        let subscribed = fx.transport.subscribed.lock().unwrap();
        assert_eq!(subscribed.len(), 2);
        assert!(subscribed.contains(&"index/NIFTY".to_string()));
        assert!(subscribed.contains(&"index/+/+/+/+".to_string()));
    }

    #[tokio::test]
    async fn test_ticks_reach_store_on_shutdown() {
        let mut fx = make_pipeline();

        fx.pipeline
            .handle_message("index/NIFTY", &single_payload(19987.0))
            .await;
        fx.pipeline
            .handle_message("index/NIFTY/22-05-2025/20000/pe", &single_payload(98.5))
            .await;

        fx.pipeline.writer.shutdown().await;

        let rows = fx.store.rows.lock().unwrap();
        assert_eq!(rows.len(), 2);
    }
}
