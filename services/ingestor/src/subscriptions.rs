//! Per-index subscription state machine
//!
//! Every configured index starts in `AwaitingFirst`. The first spot
//! tick observed for an index flips it to `Subscribed` — once per
//! process lifetime — and triggers expansion: the at-the-money strike
//! is computed from the tick price, a symmetric strike window derived,
//! and one call and one put leg resolved and subscribed per strike.
//!
//! The active-subscription set, keyed by topic string, is the sole
//! deduplication mechanism; re-subscribing an active topic is a no-op.
//! Partial expansion failures are tolerated — unresolved legs are
//! skipped and the index still transitions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use types::topic::{OptionType, Topic};

use crate::metrics::PipelineMetrics;
use crate::resolver::TokenResolver;
use crate::topology;
use crate::transport::Transport;

/// Static subscription-side configuration.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// First segment of every topic.
    pub topic_prefix: String,
    /// Indices tracked from startup.
    pub indices: Vec<String>,
    /// Expiry date label per index, as the token API expects it.
    pub expiries: HashMap<String, String>,
    /// Strikes above and below ATM to subscribe to.
    pub strike_radius: u32,
}

/// Owns per-index first-tick state and the active-subscription set.
pub struct SubscriptionManager {
    config: SubscriptionConfig,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn TokenResolver>,
    metrics: Arc<PipelineMetrics>,
    /// Per configured index: true until the first tick is observed.
    awaiting_first: HashMap<String, bool>,
    /// Latest spot price per index.
    last_price: HashMap<String, f64>,
    /// Every topic an active subscription exists for.
    active: HashSet<String>,
}

impl SubscriptionManager {
    /// Create the manager and mark every configured index as awaiting
    /// its first tick.
    pub fn new(
        config: SubscriptionConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn TokenResolver>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let awaiting_first = config
            .indices
            .iter()
            .map(|name| (name.clone(), true))
            .collect();

        info!(
            indices = config.indices.len(),
            strike_radius = config.strike_radius,
            "Subscription manager initialized"
        );

        Self {
            config,
            transport,
            resolver,
            metrics,
            awaiting_first,
            last_price: HashMap::new(),
            active: HashSet::new(),
        }
    }

    /// Subscribe to the spot topic of every configured index.
    ///
    /// Idempotent: already-active topics are skipped, so this is safe
    /// to call on every (re)connect.
    pub async fn subscribe_configured_indices(&mut self) {
        let topics: Vec<String> = self
            .config
            .indices
            .iter()
            .map(|name| Topic::index(&self.config.topic_prefix, name))
            .collect();
        for topic in topics {
            self.subscribe_if_new(&topic).await;
        }
    }

    /// Subscribe to the wildcard covering every option-contract topic:
    /// `{prefix}/+/+/+/+`. Idempotent, like the index subscriptions.
    pub async fn subscribe_option_wildcard(&mut self) {
        let pattern = format!("{}/+/+/+/+", self.config.topic_prefix);
        self.subscribe_if_new(&pattern).await;
    }

    /// Handle one decoded spot tick for an index.
    ///
    /// Unknown index names are logged and ignored; a malformed or
    /// unconfigured topic must never interrupt ingestion.
    pub async fn on_index_tick(&mut self, index_name: &str, price: f64) {
        let Some(awaiting) = self.awaiting_first.get_mut(index_name) else {
            warn!(index = index_name, price, "Tick for unconfigured index — ignoring");
            self.metrics.incr(&self.metrics.unknown_index);
            return;
        };

        self.last_price.insert(index_name.to_string(), price);

        if !*awaiting {
            return;
        }
        *awaiting = false;

        info!(index = index_name, price, "First tick observed — expanding option subscriptions");
        self.expand(index_name, price).await;
    }

    /// Resolve and subscribe the ATM strike window for an index.
    async fn expand(&mut self, index_name: &str, price: f64) {
        let Some(expiry) = self.config.expiries.get(index_name).cloned() else {
            warn!(index = index_name, "No expiry configured — skipping option expansion");
            return;
        };

        let increment = topology::strike_increment(index_name);
        let atm = topology::atm_strike(index_name, price);
        let window = topology::strike_window(atm, increment, self.config.strike_radius);

        debug!(
            index = index_name,
            atm,
            increment,
            legs = window.len() * 2,
            "Expanding strike window"
        );

        for strike in window {
            for option_type in OptionType::BOTH {
                self.metrics.incr(&self.metrics.resolutions_attempted);
                match self
                    .resolver
                    .resolve(index_name, &expiry, strike, option_type)
                    .await
                {
                    Ok(Some(token)) => {
                        let topic = Topic::option_contract(
                            &self.config.topic_prefix,
                            index_name,
                            &expiry,
                            strike,
                            option_type,
                        );
                        debug!(topic = %topic, token = %token, "Contract resolved");
                        self.subscribe_if_new(&topic).await;
                    }
                    Ok(None) => {
                        debug!(
                            index = index_name,
                            strike,
                            option_type = %option_type,
                            "No contract for leg"
                        );
                    }
                    Err(err) => {
                        warn!(
                            index = index_name,
                            strike,
                            option_type = %option_type,
                            error = %err,
                            "Token resolution failed — skipping leg"
                        );
                        self.metrics.incr(&self.metrics.resolution_failures);
                    }
                }
            }
        }
    }

    /// Subscribe to a topic unless it is already active. Returns
    /// whether a new subscription was issued.
    async fn subscribe_if_new(&mut self, topic: &str) -> bool {
        if self.active.contains(topic) {
            return false;
        }
        match self.transport.subscribe(topic).await {
            Ok(()) => {
                self.active.insert(topic.to_string());
                self.metrics
                    .set(&self.metrics.subscriptions_active, self.active.len() as u64);
                info!(topic, "Subscribed");
                true
            }
            Err(err) => {
                // Not recorded as active, so a later attempt retries.
                warn!(topic, error = %err, "Subscribe failed");
                false
            }
        }
    }

    /// Whether an index is still awaiting its first tick. `None` for
    /// unconfigured indices.
    pub fn is_awaiting_first(&self, index_name: &str) -> Option<bool> {
        self.awaiting_first.get(index_name).copied()
    }

    /// Latest observed spot price for an index.
    pub fn last_price(&self, index_name: &str) -> Option<f64> {
        self.last_price.get(index_name).copied()
    }

    /// The active-subscription set.
    pub fn active_subscriptions(&self) -> &HashSet<String> {
        &self.active
    }
}
