use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rumqttc::{Event, Packet};
use tokio::signal;
use tracing::{info, warn};

use tick_ingestor::batch::BatcherConfig;
use tick_ingestor::config::Config;
use tick_ingestor::metrics::PipelineMetrics;
use tick_ingestor::pipeline::Pipeline;
use tick_ingestor::resolver::HttpTokenResolver;
use tick_ingestor::store::{PgTickStore, TickStore};
use tick_ingestor::subscriptions::{SubscriptionConfig, SubscriptionManager};
use tick_ingestor::transport::{self, MqttTransport};
use tick_ingestor::writer;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!(
        version = tick_ingestor::SERVICE_VERSION,
        "Starting tick ingestion service"
    );

    let config = Config::from_env().context("loading configuration")?;

    // A store that cannot come up is the one fatal startup condition.
    let store = Arc::new(PgTickStore::connect(&config.store).context("creating store pool")?);
    store
        .init_schema()
        .await
        .context("initializing store schema")?;

    let resolver = Arc::new(
        HttpTokenResolver::new(&config.app.token_api_url, config.app.resolve_timeout)
            .context("building token resolver")?,
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let writer_handle = writer::spawn(
        store.clone(),
        BatcherConfig {
            max_size: config.app.batch_size,
            max_wait: config.app.batch_interval,
        },
        metrics.clone(),
    );

    let (transport, mut event_loop) = MqttTransport::connect(
        &config.mqtt,
        transport::request_capacity(config.app.indices.len(), config.app.strike_radius),
    );
    let transport = Arc::new(transport);

    let subscriptions = SubscriptionManager::new(
        SubscriptionConfig {
            topic_prefix: config.app.topic_prefix.clone(),
            indices: config.app.indices.clone(),
            expiries: config.app.expiries.clone(),
            strike_radius: config.app.strike_radius,
        },
        transport.clone(),
        resolver,
        metrics.clone(),
    );

    let mut pipeline = Pipeline::new(subscriptions, writer_handle.clone(), metrics.clone());

    info!("Application started");

    loop {
        tokio::select! {
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to broker");
                    // Safe on every reconnect: subscriptions dedup by topic.
                    pipeline.on_connected().await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    pipeline.handle_message(&publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "Broker connection error — backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            },
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Ordered teardown: intake already stopped (loop exited), then
    // drain and flush, then release the store.
    writer_handle.shutdown().await;
    transport.disconnect().await;
    store.close();

    info!(counters = ?metrics.export(), "Shutdown complete");
    Ok(())
}
