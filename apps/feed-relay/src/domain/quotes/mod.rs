//! Latest-Quote Selection
//!
//! Aggregator candle pages return a `"quotes"` array covering a whole
//! window; the relay only republishes the most recent record. Each record
//! optionally nests a `"quote"` object carrying the primary `"timestamp"`,
//! with a record-level `"time_close"` as fallback. The record with the
//! latest effective timestamp wins; ties keep the first-seen record.
//!
//! A malformed timestamp is an error, never silently skipped: the caller
//! decides whether to drop the payload.

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

/// Key of the quote-record array in a payload's data.
pub const QUOTES: &str = "quotes";
/// Key of the nested quote object inside one record.
pub const QUOTE: &str = "quote";
/// Key of the primary timestamp inside the nested quote object.
pub const TIMESTAMP: &str = "timestamp";
/// Record-level fallback timestamp key.
pub const TIME_CLOSE: &str = "time_close";

/// Quote selection failure.
#[derive(Debug, thiserror::Error)]
pub enum QuoteSelectError {
    /// A quote record carried a timestamp that is not valid RFC 3339.
    #[error("malformed quote timestamp {value:?}: {source}")]
    TimestampParse {
        /// The offending timestamp string.
        value: String,
        /// Underlying parse failure.
        source: chrono::ParseError,
    },
}

/// Reduce the `"quotes"` array of `data` to its single latest record.
///
/// Returns a new mapping identical to the input except for the reduced
/// array; all other fields are untouched. The input is returned unchanged
/// (cloned) when it has no `"quotes"` array, when the array is empty, or
/// when no record carries a parseable timestamp field.
///
/// # Errors
///
/// Returns [`QuoteSelectError::TimestampParse`] if any considered record
/// carries a timestamp string that does not parse as RFC 3339.
pub fn select_latest(data: &Map<String, Value>) -> Result<Map<String, Value>, QuoteSelectError> {
    let Some(Value::Array(records)) = data.get(QUOTES) else {
        return Ok(data.clone());
    };

    let mut latest: Option<&Value> = None;
    let mut latest_ts: Option<DateTime<FixedOffset>> = None;

    for record in records {
        let Some(ts) = effective_timestamp(record)? else {
            continue;
        };
        // Strict comparison keeps the first-seen record on ties.
        if latest_ts.is_none_or(|current| ts > current) {
            latest_ts = Some(ts);
            latest = Some(record);
        }
    }

    let Some(selected) = latest else {
        return Ok(data.clone());
    };

    let mut reduced = data.clone();
    reduced.insert(QUOTES.to_string(), Value::Array(vec![selected.clone()]));
    Ok(reduced)
}

/// Effective timestamp of one record: primary if present, else fallback.
///
/// A record with neither field yields `Ok(None)` and is never selected.
fn effective_timestamp(
    record: &Value,
) -> Result<Option<DateTime<FixedOffset>>, QuoteSelectError> {
    let primary = record
        .get(QUOTE)
        .and_then(|quote| quote.get(TIMESTAMP))
        .and_then(Value::as_str);
    let fallback = record.get(TIME_CLOSE).and_then(Value::as_str);

    match primary.or(fallback) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(Some)
            .map_err(|source| QuoteSelectError::TimestampParse {
                value: raw.to_string(),
                source,
            }),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn data_with_quotes(quotes: Value) -> Map<String, Value> {
        let Value::Object(map) = json!({
            "symbol": "BTC-USD",
            "quotes": quotes,
            "interval": "1d",
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn selects_latest_by_primary_timestamp() {
        let data = data_with_quotes(json!([
            { "quote": { "timestamp": "2024-01-02T00:00:00Z", "close": 2.0 } },
            { "quote": { "timestamp": "2024-01-03T00:00:00Z", "close": 3.0 } },
            { "quote": { "timestamp": "2024-01-01T00:00:00Z", "close": 1.0 } },
        ]));

        let reduced = select_latest(&data).unwrap();
        let quotes = reduced[QUOTES].as_array().unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0]["quote"]["close"], json!(3.0));
    }

    #[test]
    fn fallback_close_time_beats_earlier_primaries() {
        let data = data_with_quotes(json!([
            { "quote": { "timestamp": "2024-01-01T00:00:00Z" } },
            { "quote": { "timestamp": "2024-01-02T00:00:00Z" } },
            { "time_close": "2024-01-03T00:00:00Z" },
        ]));

        let reduced = select_latest(&data).unwrap();
        let quotes = reduced[QUOTES].as_array().unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0]["time_close"], json!("2024-01-03T00:00:00Z"));
    }

    #[test]
    fn primary_wins_over_fallback_within_one_record() {
        let data = data_with_quotes(json!([
            {
                "quote": { "timestamp": "2024-06-01T00:00:00Z", "close": 9.0 },
                "time_close": "2024-01-01T00:00:00Z",
            },
            { "quote": { "timestamp": "2024-03-01T00:00:00Z", "close": 5.0 } },
        ]));

        let reduced = select_latest(&data).unwrap();
        assert_eq!(reduced[QUOTES][0]["quote"]["close"], json!(9.0));
    }

    #[test]
    fn empty_list_is_returned_unchanged() {
        let data = data_with_quotes(json!([]));
        let reduced = select_latest(&data).unwrap();
        assert_eq!(reduced, data);
        assert!(reduced[QUOTES].as_array().unwrap().is_empty());
    }

    #[test]
    fn tie_keeps_first_seen_record() {
        let data = data_with_quotes(json!([
            { "quote": { "timestamp": "2024-01-01T00:00:00Z", "close": 1.0 } },
            { "quote": { "timestamp": "2024-01-01T00:00:00Z", "close": 2.0 } },
        ]));

        let reduced = select_latest(&data).unwrap();
        assert_eq!(reduced[QUOTES][0]["quote"]["close"], json!(1.0));
    }

    #[test]
    fn record_without_timestamps_is_never_selected() {
        let data = data_with_quotes(json!([
            { "quote": { "close": 1.0 } },
            { "quote": { "timestamp": "2024-01-01T00:00:00Z", "close": 2.0 } },
        ]));

        let reduced = select_latest(&data).unwrap();
        assert_eq!(reduced[QUOTES][0]["quote"]["close"], json!(2.0));
    }

    #[test]
    fn only_record_without_timestamps_leaves_data_unmodified() {
        let data = data_with_quotes(json!([ { "quote": { "close": 1.0 } } ]));
        let reduced = select_latest(&data).unwrap();
        assert_eq!(reduced, data);
        assert_eq!(reduced[QUOTES].as_array().unwrap().len(), 1);
    }

    #[test]
    fn malformed_timestamp_is_an_error() {
        let data = data_with_quotes(json!([
            { "quote": { "timestamp": "not-a-timestamp" } },
        ]));

        let err = select_latest(&data).unwrap_err();
        match err {
            QuoteSelectError::TimestampParse { value, .. } => {
                assert_eq!(value, "not-a-timestamp");
            }
        }
    }

    #[test]
    fn missing_quotes_key_is_returned_unchanged() {
        let Value::Object(data) = json!({ "symbol": "BTC-USD" }) else {
            unreachable!()
        };
        let reduced = select_latest(&data).unwrap();
        assert_eq!(reduced, data);
    }

    #[test]
    fn other_fields_survive_reduction() {
        let data = data_with_quotes(json!([
            { "quote": { "timestamp": "2024-01-01T00:00:00Z" } },
        ]));

        let reduced = select_latest(&data).unwrap();
        assert_eq!(reduced["symbol"], json!("BTC-USD"));
        assert_eq!(reduced["interval"], json!("1d"));
    }
}
