//! Routing Policy
//!
//! Maps a payload's `(Provider, Source)` provenance to the logical output
//! stream it should be republished on. The policy is an explicit ordered
//! list of `(predicate, destination)` rules evaluated first-match, so it
//! can be inspected and tested as data rather than buried in conditionals.
//!
//! An unmatched combination yields `None`. That is a designed skip, not an
//! error: the publisher treats it as "no publish attempted".

use crate::domain::payload::{Provider, Source};

// =============================================================================
// Stream Kinds
// =============================================================================

/// Logical output stream, the codomain of the routing policy.
///
/// Concrete broker stream names are configuration; the domain only knows
/// the logical destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Raw exchange ticker payloads.
    ExchangeTicks,
    /// Scraped exchange metric payloads.
    ExchangeInsights,
    /// Aggregator quote payloads.
    AggregatorQuotes,
}

impl StreamKind {
    /// Get the stream kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExchangeTicks => "exchange-ticks",
            Self::ExchangeInsights => "exchange-insights",
            Self::AggregatorQuotes => "aggregator-quotes",
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Predicate over a payload's provenance.
#[derive(Debug, Clone)]
enum RoutePredicate {
    /// Matches every source of one provider.
    Provider(Provider),
    /// Matches one provider restricted to a fixed source set.
    ProviderSources(Provider, &'static [Source]),
}

impl RoutePredicate {
    fn matches(&self, provider: Provider, source: Source) -> bool {
        match self {
            Self::Provider(p) => *p == provider,
            Self::ProviderSources(p, sources) => *p == provider && sources.contains(&source),
        }
    }
}

/// One routing rule: first matching rule wins.
#[derive(Debug, Clone)]
struct RouteRule {
    predicate: RoutePredicate,
    destination: StreamKind,
}

/// Metric sources scraped from exchange pages.
const METRIC_SOURCES: &[Source] = &[
    Source::MarketDigest,
    Source::LaunchPool,
    Source::LaunchPad,
    Source::EarnOffer,
];

/// Market sources streamed live from the exchange.
const MARKET_SOURCES: &[Source] = &[Source::SpotTicker, Source::LinearTicker];

// =============================================================================
// Routing Table
// =============================================================================

/// Ordered first-match routing policy.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: Vec<RouteRule>,
}

impl RoutingTable {
    /// The standard relay policy:
    ///
    /// 1. aggregator payloads, any source, go to the aggregator stream;
    /// 2. exchange metric sources go to the insights stream;
    /// 3. exchange market sources go to the ticks stream;
    /// 4. anything else has no route.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            rules: vec![
                RouteRule {
                    predicate: RoutePredicate::Provider(Provider::Aggregator),
                    destination: StreamKind::AggregatorQuotes,
                },
                RouteRule {
                    predicate: RoutePredicate::ProviderSources(Provider::Exchange, METRIC_SOURCES),
                    destination: StreamKind::ExchangeInsights,
                },
                RouteRule {
                    predicate: RoutePredicate::ProviderSources(Provider::Exchange, MARKET_SOURCES),
                    destination: StreamKind::ExchangeTicks,
                },
            ],
        }
    }

    /// Resolve the destination for a provenance pair.
    ///
    /// Pure and total: `None` means "no configured destination", never an
    /// error.
    #[must_use]
    pub fn route(&self, provider: Provider, source: Source) -> Option<StreamKind> {
        self.rules
            .iter()
            .find(|rule| rule.predicate.matches(provider, source))
            .map(|rule| rule.destination)
    }

    /// Distinct destinations in rule order.
    ///
    /// Drives producer-handle setup: the publisher opens exactly one
    /// handle per entry.
    #[must_use]
    pub fn destinations(&self) -> Vec<StreamKind> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.destination) {
                seen.push(rule.destination);
            }
        }
        seen
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Provider::Aggregator, Source::FearGreedIndex => Some(StreamKind::AggregatorQuotes); "aggregator fgi")]
    #[test_case(Provider::Aggregator, Source::BtcUsdDaily => Some(StreamKind::AggregatorQuotes); "aggregator daily")]
    #[test_case(Provider::Aggregator, Source::SpotTicker => Some(StreamKind::AggregatorQuotes); "aggregator wins over source set")]
    #[test_case(Provider::Exchange, Source::MarketDigest => Some(StreamKind::ExchangeInsights); "exchange digest")]
    #[test_case(Provider::Exchange, Source::LaunchPool => Some(StreamKind::ExchangeInsights); "exchange launch pool")]
    #[test_case(Provider::Exchange, Source::LaunchPad => Some(StreamKind::ExchangeInsights); "exchange launch pad")]
    #[test_case(Provider::Exchange, Source::EarnOffer => Some(StreamKind::ExchangeInsights); "exchange earn")]
    #[test_case(Provider::Exchange, Source::SpotTicker => Some(StreamKind::ExchangeTicks); "exchange spot")]
    #[test_case(Provider::Exchange, Source::LinearTicker => Some(StreamKind::ExchangeTicks); "exchange linear")]
    #[test_case(Provider::Exchange, Source::FearGreedIndex => None; "exchange fgi unrouted")]
    #[test_case(Provider::Exchange, Source::BtcUsdDaily => None; "exchange daily unrouted")]
    #[test_case(Provider::Exchange, Source::BtcUsdWeekly => None; "exchange weekly unrouted")]
    fn standard_policy(provider: Provider, source: Source) -> Option<StreamKind> {
        RoutingTable::standard().route(provider, source)
    }

    #[test]
    fn destinations_are_distinct_in_rule_order() {
        let destinations = RoutingTable::standard().destinations();
        assert_eq!(
            destinations,
            [
                StreamKind::AggregatorQuotes,
                StreamKind::ExchangeInsights,
                StreamKind::ExchangeTicks,
            ]
        );
    }

    #[test]
    fn first_match_wins() {
        // A table with an overlapping catch-all in front must shadow the
        // narrower rule behind it.
        let table = RoutingTable {
            rules: vec![
                RouteRule {
                    predicate: RoutePredicate::Provider(Provider::Exchange),
                    destination: StreamKind::ExchangeTicks,
                },
                RouteRule {
                    predicate: RoutePredicate::ProviderSources(Provider::Exchange, METRIC_SOURCES),
                    destination: StreamKind::ExchangeInsights,
                },
            ],
        };
        assert_eq!(
            table.route(Provider::Exchange, Source::MarketDigest),
            Some(StreamKind::ExchangeTicks)
        );
    }
}
