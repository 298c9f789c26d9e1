//! Feed Relay Binary
//!
//! Starts the routed stream collector.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin feed-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `BROKER_HOST`: Relay broker host
//! - `BROKER_PORT`: Relay broker stream port
//! - `BROKER_USERNAME`: Broker user
//! - `BROKER_PASSWORD`: Broker password
//! - `RELAY_TICKS_STREAM`: Output stream for exchange tickers
//! - `RELAY_INSIGHTS_STREAM`: Output stream for exchange metrics
//! - `RELAY_QUOTES_STREAM`: Output stream for aggregator quotes
//! - `RELAY_SPOT_WS_URL` / `RELAY_LINEAR_WS_URL`: Exchange WebSocket
//!   endpoints (when the exchange stream module is enabled)
//! - `RELAY_INSIGHTS_URL`: Exchange metrics page (when the insights
//!   module is enabled)
//! - `RELAY_FGI_URL` / `RELAY_BTC_DAILY_URL` / `RELAY_BTC_WEEKLY_URL`:
//!   Aggregator quote pages (when the aggregator module is enabled)
//!
//! ## Optional
//! - `RELAY_EXCHANGE_STREAM_ENABLED` / `RELAY_EXCHANGE_INSIGHTS_ENABLED` /
//!   `RELAY_AGGREGATOR_ENABLED`: Module toggles (default: true)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `RELAY_POLL_INTERVAL_SECS`: Page poll interval (default: 60)
//! - `RELAY_CHANNEL_CAPACITY`: Feed channel capacity (default: 1024)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use feed_relay::{
    FeedConsumer, HealthServer, HealthServerState, MarketFeed, PollingFeed, Provider, RelayConfig,
    RoutedPublisher, RoutingTable, Source, TcpBrokerConnector, WebSocketFeed,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting Feed Relay");

    let config = RelayConfig::from_env().context("configuration invalid")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Publisher over the injected broker connector. Lifecycle errors here
    // are fatal: the process must not run partially wired.
    let connector = TcpBrokerConnector::new(config.broker.clone());
    let publisher = Arc::new(RoutedPublisher::new(
        Box::new(connector),
        RoutingTable::standard(),
        config.streams.clone().into(),
    ));
    publisher
        .start()
        .await
        .context("failed to start publisher")?;

    let consumers = build_consumers(&config, &publisher)?;
    for consumer in &consumers {
        if let Err(error) = consumer.start().await {
            tracing::error!(%error, "Consumer failed to start");
            shutdown(&consumers, &publisher).await;
            return Err(error.into());
        }
    }

    // Health server reports readiness from live publisher state.
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&publisher),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(error) = health_server.run().await {
            tracing::error!(%error, "Health server error");
        }
    });

    tracing::info!("Feed relay ready");

    await_shutdown().await;
    shutdown_token.cancel();
    shutdown(&consumers, &publisher).await;

    tracing::info!("Feed relay stopped");
    Ok(())
}

/// Build the fan-in consumers for the enabled modules.
fn build_consumers(
    config: &RelayConfig,
    publisher: &Arc<RoutedPublisher>,
) -> anyhow::Result<Vec<FeedConsumer>> {
    let capacity = config.feeds.channel_capacity;
    let mut consumers = Vec::new();

    if config.toggles.exchange_stream {
        let spot_url = config
            .feeds
            .spot_ws_url
            .clone()
            .context("spot WebSocket URL missing")?;
        let linear_url = config
            .feeds
            .linear_ws_url
            .clone()
            .context("linear WebSocket URL missing")?;
        let feeds: Vec<Arc<dyn MarketFeed>> = vec![
            Arc::new(WebSocketFeed::new(
                Provider::Exchange,
                Source::SpotTicker,
                spot_url,
                capacity,
            )),
            Arc::new(WebSocketFeed::new(
                Provider::Exchange,
                Source::LinearTicker,
                linear_url,
                capacity,
            )),
        ];
        consumers.push(FeedConsumer::new(
            "exchange-ticks",
            feeds,
            Arc::clone(publisher),
        ));
    }

    if config.toggles.exchange_insights {
        let url = config
            .feeds
            .insights_url
            .clone()
            .context("insights URL missing")?;
        let feeds: Vec<Arc<dyn MarketFeed>> = vec![Arc::new(PollingFeed::new(
            Provider::Exchange,
            Source::MarketDigest,
            url,
            config.feeds.poll_interval,
            capacity,
        ))];
        consumers.push(FeedConsumer::new(
            "exchange-insights",
            feeds,
            Arc::clone(publisher),
        ));
    }

    if config.toggles.aggregator {
        let pages = config.feeds.aggregator_pages();
        if pages.is_empty() {
            anyhow::bail!("aggregator page URLs missing");
        }
        let feeds: Vec<Arc<dyn MarketFeed>> = pages
            .into_iter()
            .map(|(source, url)| {
                Arc::new(PollingFeed::new(
                    Provider::Aggregator,
                    source,
                    url,
                    config.feeds.poll_interval,
                    capacity,
                )) as Arc<dyn MarketFeed>
            })
            .collect();
        consumers.push(
            FeedConsumer::new("aggregator", feeds, Arc::clone(publisher))
                .with_quote_selection([Source::BtcUsdDaily, Source::BtcUsdWeekly]),
        );
    }

    Ok(consumers)
}

/// Stop consumers first so nothing publishes into a closing publisher.
async fn shutdown(consumers: &[FeedConsumer], publisher: &Arc<RoutedPublisher>) {
    for consumer in consumers {
        consumer.stop().await;
    }
    publisher.stop().await;
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        ticks_stream = %config.streams.ticks,
        insights_stream = %config.streams.insights,
        quotes_stream = %config.streams.quotes,
        health_port = config.server.health_port,
        exchange_stream = config.toggles.exchange_stream,
        exchange_insights = config.toggles.exchange_insights,
        aggregator = config.toggles.aggregator,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
