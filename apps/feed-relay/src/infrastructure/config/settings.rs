//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//! Loading collects every missing or invalid key before failing, so a
//! misconfigured deployment reports the full list at once instead of one
//! key per restart.

use std::time::Duration;

use crate::application::publisher::OutputStreams;
use crate::domain::payload::Source;

/// Broker connection settings.
#[derive(Clone)]
pub struct BrokerSettings {
    /// Broker host name.
    pub host: String,
    /// Broker stream port.
    pub port: u16,
    /// Authentication user.
    pub username: String,
    password: String,
}

impl BrokerSettings {
    /// Create broker settings.
    #[must_use]
    pub const fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
        }
    }

    /// Get the authentication password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Output stream names.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Stream for raw exchange tickers.
    pub ticks: String,
    /// Stream for scraped exchange metrics.
    pub insights: String,
    /// Stream for aggregator quotes.
    pub quotes: String,
}

impl From<StreamSettings> for OutputStreams {
    fn from(settings: StreamSettings) -> Self {
        Self {
            ticks: settings.ticks,
            insights: settings.insights,
            quotes: settings.quotes,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Which upstream modules run in this process.
#[derive(Debug, Clone)]
pub struct FeedToggles {
    /// Live exchange ticker streams.
    pub exchange_stream: bool,
    /// Scraped exchange metric pages.
    pub exchange_insights: bool,
    /// Polled aggregator quote pages.
    pub aggregator: bool,
}

impl Default for FeedToggles {
    fn default() -> Self {
        Self {
            exchange_stream: true,
            exchange_insights: true,
            aggregator: true,
        }
    }
}

/// Upstream endpoints and feed plumbing.
#[derive(Debug, Clone)]
pub struct FeedEndpoints {
    /// Spot ticker WebSocket URL (required when the exchange stream
    /// module is enabled).
    pub spot_ws_url: Option<String>,
    /// Linear ticker WebSocket URL (required when the exchange stream
    /// module is enabled).
    pub linear_ws_url: Option<String>,
    /// Exchange metrics page URL (required when the insights module is
    /// enabled).
    pub insights_url: Option<String>,
    /// Aggregator fear & greed page URL (required when the aggregator
    /// module is enabled).
    pub fgi_url: Option<String>,
    /// Aggregator BTC/USD daily candle page URL (required when the
    /// aggregator module is enabled).
    pub btc_daily_url: Option<String>,
    /// Aggregator BTC/USD weekly candle page URL (required when the
    /// aggregator module is enabled).
    pub btc_weekly_url: Option<String>,
    /// Poll interval for page-based feeds.
    pub poll_interval: Duration,
    /// Capacity of each feed's payload channel.
    pub channel_capacity: usize,
}

impl FeedEndpoints {
    /// Configured aggregator pages, paired with the source each one
    /// produces. Unset pages are skipped.
    #[must_use]
    pub fn aggregator_pages(&self) -> Vec<(Source, String)> {
        [
            (Source::FearGreedIndex, &self.fgi_url),
            (Source::BtcUsdDaily, &self.btc_daily_url),
            (Source::BtcUsdWeekly, &self.btc_weekly_url),
        ]
        .into_iter()
        .filter_map(|(source, url)| url.clone().map(|url| (source, url)))
        .collect()
    }
}

impl Default for FeedEndpoints {
    fn default() -> Self {
        Self {
            spot_ws_url: None,
            linear_ws_url: None,
            insights_url: None,
            fgi_url: None,
            btc_daily_url: None,
            btc_weekly_url: None,
            poll_interval: Duration::from_secs(60),
            channel_capacity: 1_024,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Broker connection settings.
    pub broker: BrokerSettings,
    /// Output stream names.
    pub streams: StreamSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Enabled upstream modules.
    pub toggles: FeedToggles,
    /// Upstream endpoints.
    pub feeds: FeedEndpoints,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] listing every required variable
    /// that is absent, empty, or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();

        let host = required("BROKER_HOST", &mut missing);
        let port = required_port("BROKER_PORT", &mut missing);
        let username = required("BROKER_USERNAME", &mut missing);
        let password = required("BROKER_PASSWORD", &mut missing);

        let ticks = required("RELAY_TICKS_STREAM", &mut missing);
        let insights = required("RELAY_INSIGHTS_STREAM", &mut missing);
        let quotes = required("RELAY_QUOTES_STREAM", &mut missing);

        let toggles = FeedToggles {
            exchange_stream: parse_env_bool(
                "RELAY_EXCHANGE_STREAM_ENABLED",
                FeedToggles::default().exchange_stream,
            ),
            exchange_insights: parse_env_bool(
                "RELAY_EXCHANGE_INSIGHTS_ENABLED",
                FeedToggles::default().exchange_insights,
            ),
            aggregator: parse_env_bool(
                "RELAY_AGGREGATOR_ENABLED",
                FeedToggles::default().aggregator,
            ),
        };

        // Endpoints are only required for modules that actually run.
        let spot_ws_url = if toggles.exchange_stream {
            required("RELAY_SPOT_WS_URL", &mut missing)
        } else {
            optional("RELAY_SPOT_WS_URL")
        };
        let linear_ws_url = if toggles.exchange_stream {
            required("RELAY_LINEAR_WS_URL", &mut missing)
        } else {
            optional("RELAY_LINEAR_WS_URL")
        };
        let insights_url = if toggles.exchange_insights {
            required("RELAY_INSIGHTS_URL", &mut missing)
        } else {
            optional("RELAY_INSIGHTS_URL")
        };
        let fgi_url = if toggles.aggregator {
            required("RELAY_FGI_URL", &mut missing)
        } else {
            optional("RELAY_FGI_URL")
        };
        let btc_daily_url = if toggles.aggregator {
            required("RELAY_BTC_DAILY_URL", &mut missing)
        } else {
            optional("RELAY_BTC_DAILY_URL")
        };
        let btc_weekly_url = if toggles.aggregator {
            required("RELAY_BTC_WEEKLY_URL", &mut missing)
        } else {
            optional("RELAY_BTC_WEEKLY_URL")
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let defaults = FeedEndpoints::default();
        Ok(Self {
            broker: BrokerSettings {
                host: host.unwrap_or_default(),
                port: port.unwrap_or_default(),
                username: username.unwrap_or_default(),
                password: password.unwrap_or_default(),
            },
            streams: StreamSettings {
                ticks: ticks.unwrap_or_default(),
                insights: insights.unwrap_or_default(),
                quotes: quotes.unwrap_or_default(),
            },
            server: ServerSettings {
                health_port: parse_env_u16(
                    "RELAY_HEALTH_PORT",
                    ServerSettings::default().health_port,
                ),
            },
            toggles,
            feeds: FeedEndpoints {
                spot_ws_url,
                linear_ws_url,
                insights_url,
                fgi_url,
                btc_daily_url,
                btc_weekly_url,
                poll_interval: parse_env_duration_secs(
                    "RELAY_POLL_INTERVAL_SECS",
                    defaults.poll_interval,
                ),
                channel_capacity: parse_env_usize(
                    "RELAY_CHANNEL_CAPACITY",
                    defaults.channel_capacity,
                ),
            },
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// One or more required values are absent, empty, or invalid.
    #[error("missing required configuration properties: {0:?}")]
    Missing(Vec<String>),
}

fn required(key: &str, missing: &mut Vec<String>) -> Option<String> {
    match optional(key) {
        Some(value) => Some(value),
        None => {
            missing.push(key.to_string());
            None
        }
    }
}

fn required_port(key: &str, missing: &mut Vec<String>) -> Option<u16> {
    match optional(key).map(|v| v.parse::<u16>()) {
        Some(Ok(port)) if port > 0 => Some(port),
        Some(_) => {
            missing.push(format!("{key} (must be a positive port number)"));
            None
        }
        None => {
            missing.push(key.to_string());
            None
        }
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_settings_redact_password() {
        let settings = BrokerSettings::new(
            "broker.local".to_string(),
            5552,
            "relay".to_string(),
            "hunter2".to_string(),
        );
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(settings.password(), "hunter2");
    }

    #[test]
    fn stream_settings_map_to_output_streams() {
        let streams: OutputStreams = StreamSettings {
            ticks: "a".to_string(),
            insights: "b".to_string(),
            quotes: "c".to_string(),
        }
        .into();
        assert_eq!(streams.ticks, "a");
        assert_eq!(streams.insights, "b");
        assert_eq!(streams.quotes, "c");
    }

    #[test]
    fn server_settings_defaults() {
        assert_eq!(ServerSettings::default().health_port, 8082);
    }

    #[test]
    fn feed_toggles_default_on() {
        let toggles = FeedToggles::default();
        assert!(toggles.exchange_stream);
        assert!(toggles.exchange_insights);
        assert!(toggles.aggregator);
    }

    #[test]
    fn feed_endpoint_defaults() {
        let endpoints = FeedEndpoints::default();
        assert_eq!(endpoints.poll_interval, Duration::from_secs(60));
        assert_eq!(endpoints.channel_capacity, 1_024);
        assert!(endpoints.aggregator_pages().is_empty());
    }

    #[test]
    fn aggregator_pages_cover_every_aggregator_source() {
        let endpoints = FeedEndpoints {
            fgi_url: Some("https://agg.local/fgi".to_string()),
            btc_daily_url: Some("https://agg.local/btc-1d".to_string()),
            btc_weekly_url: Some("https://agg.local/btc-1w".to_string()),
            ..FeedEndpoints::default()
        };
        let pages = endpoints.aggregator_pages();
        let sources: Vec<Source> = pages.iter().map(|(source, _)| *source).collect();
        assert_eq!(
            sources,
            [
                Source::FearGreedIndex,
                Source::BtcUsdDaily,
                Source::BtcUsdWeekly,
            ]
        );
        assert_eq!(pages[0].1, "https://agg.local/fgi");
    }

    #[test]
    fn unset_aggregator_pages_are_skipped() {
        let endpoints = FeedEndpoints {
            btc_weekly_url: Some("https://agg.local/btc-1w".to_string()),
            ..FeedEndpoints::default()
        };
        let pages = endpoints.aggregator_pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].0, Source::BtcUsdWeekly);
    }

    // Process-wide environment mutation is not safe under the parallel
    // test runner, so `from_env` is covered by the deployment smoke
    // checks rather than unit tests here.
}
