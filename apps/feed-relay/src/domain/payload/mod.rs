//! Payload Types
//!
//! One unit of data produced by an upstream feed, tagged with its
//! provenance. The `data` mapping is opaque to the relay: it is carried
//! through to the broker as-is, except for the single permitted in-place
//! transform (quote selection) applied by a consumer before publish.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Provenance Tags
// =============================================================================

/// Origin system of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    /// Live exchange connections (WebSocket streams and scraped pages).
    Exchange,
    /// The market aggregator's scraped quote pages.
    Aggregator,
}

impl Provider {
    /// Get the provider name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange => "EXCHANGE",
            Self::Aggregator => "AGGREGATOR",
        }
    }
}

/// Feed identifier within a provider.
///
/// Closed set: routing policy and consumer wiring are total over these
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// Spot market ticker stream.
    SpotTicker,
    /// Linear (perpetual) market ticker stream.
    LinearTicker,
    /// Scraped market digest page.
    MarketDigest,
    /// Scraped launch pool listings.
    LaunchPool,
    /// Scraped launch pad listings.
    LaunchPad,
    /// Scraped earn offers.
    EarnOffer,
    /// Aggregator fear & greed index.
    FearGreedIndex,
    /// Aggregator BTC/USD daily candles.
    BtcUsdDaily,
    /// Aggregator BTC/USD weekly candles.
    BtcUsdWeekly,
}

impl Source {
    /// Get the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SpotTicker => "SPOT_TICKER",
            Self::LinearTicker => "LINEAR_TICKER",
            Self::MarketDigest => "MARKET_DIGEST",
            Self::LaunchPool => "LAUNCH_POOL",
            Self::LaunchPad => "LAUNCH_PAD",
            Self::EarnOffer => "EARN_OFFER",
            Self::FearGreedIndex => "FEAR_GREED_INDEX",
            Self::BtcUsdDaily => "BTC_USD_DAILY",
            Self::BtcUsdWeekly => "BTC_USD_WEEKLY",
        }
    }
}

// =============================================================================
// Payload
// =============================================================================

/// One unit of upstream data with its provenance.
///
/// The mapping preserves upstream key order (`serde_json` is built with
/// `preserve_order`), so the bytes written to the broker keep the shape
/// the feed produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    /// Origin system.
    pub provider: Provider,
    /// Feed identifier within the origin system.
    pub source: Source,
    /// The payload body, an ordered string-to-value mapping.
    pub data: Map<String, Value>,
}

impl Payload {
    /// Create a payload from its parts.
    #[must_use]
    pub const fn new(provider: Provider, source: Source, data: Map<String, Value>) -> Self {
        Self {
            provider,
            source,
            data,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&Provider::Exchange).unwrap(),
            "\"EXCHANGE\""
        );
        assert_eq!(
            serde_json::to_string(&Provider::Aggregator).unwrap(),
            "\"AGGREGATOR\""
        );
    }

    #[test]
    fn source_round_trips() {
        for source in [
            Source::SpotTicker,
            Source::LinearTicker,
            Source::MarketDigest,
            Source::LaunchPool,
            Source::LaunchPad,
            Source::EarnOffer,
            Source::FearGreedIndex,
            Source::BtcUsdDaily,
            Source::BtcUsdWeekly,
        ] {
            let json = serde_json::to_string(&source).unwrap();
            let back: Source = serde_json::from_str(&json).unwrap();
            assert_eq!(back, source);
            assert_eq!(json, format!("\"{}\"", source.as_str()));
        }
    }

    #[test]
    fn payload_data_preserves_key_order() {
        let parsed: Map<String, Value> =
            serde_json::from_str(r#"{"zebra":1,"apple":2,"mid":3}"#).unwrap();
        let payload = Payload::new(Provider::Exchange, Source::SpotTicker, parsed);
        let keys: Vec<&String> = payload.data.keys().collect();
        assert_eq!(keys, ["zebra", "apple", "mid"]);
    }
}
