//! Value parsing utilities for completed-request timings
//!
//! Handles the Go-style duration strings the query service prints
//! (`"681.413039ms"`, `"146.266µs"`, `"1h4m17.8098098s"`) and converts them
//! to floating-point milliseconds.

use crate::services::query_analyzer::parser::error::{ParseError, ParseResult};
use crate::utils::BoundedCache;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// One number with a sub-second unit
static SINGLE_UNIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(ms|ns|µs|μs|us)$").unwrap());

/// Hours / minutes / seconds composite, every part optional
static COMPOSITE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+(?:\.\d+)?)h)?(?:(\d+(?:\.\d+)?)m)?(?:(\d+(?:\.\d+)?)s)?$").unwrap()
});

const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_MINUTE: f64 = 60_000.0;
const MS_PER_SECOND: f64 = 1_000.0;

/// Value parser for request timings
pub struct ValueParser;

impl ValueParser {
    /// Parse a duration string to milliseconds
    ///
    /// Single-unit forms (`ms`, `ns`, `µs`/`μs`/`us`) are tried first, then
    /// the `h?m?s?` composite.
    ///
    /// # Examples
    /// ```ignore
    /// let ms = ValueParser::parse_duration_ms("4m17.8s").unwrap();
    /// assert_eq!(ms, 257_800.0);
    /// ```
    pub fn parse_duration_ms(input: &str) -> ParseResult<f64> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseError::ParseDurationError("empty duration".to_string()));
        }

        if let Some(cap) = SINGLE_UNIT_REGEX.captures(input) {
            let value = Self::parse_component(&cap[1], input)?;
            let ms = match &cap[2] {
                "ms" => value,
                "ns" => value / 1_000_000.0,
                // µs (micro sign), μs (greek mu), us
                _ => value / 1_000.0,
            };
            return Ok(ms);
        }

        if let Some(cap) = COMPOSITE_REGEX.captures(input) {
            let mut total = 0.0;
            let mut found_any = false;

            for (group, factor) in [(1, MS_PER_HOUR), (2, MS_PER_MINUTE), (3, MS_PER_SECOND)] {
                if let Some(m) = cap.get(group) {
                    found_any = true;
                    total += Self::parse_component(m.as_str(), input)? * factor;
                }
            }

            if found_any {
                return Ok(total);
            }
        }

        Err(ParseError::ParseDurationError(format!("Unrecognized duration '{}'", input)))
    }

    /// Parse a stats counter that may be a duration string or a plain number of ms
    pub fn parse_duration_value(value: &serde_json::Value) -> ParseResult<f64> {
        match value {
            serde_json::Value::String(s) => Self::parse_duration_ms(s),
            serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
                ParseError::ParseNumberError(format!("Non-finite duration number {}", n))
            }),
            other => Err(ParseError::ParseDurationError(format!(
                "Unsupported duration value {}",
                other
            ))),
        }
    }

    /// Parse a request timestamp
    ///
    /// Accepts RFC 3339 and the query service's own
    /// `2024-03-12 10:15:30.123456789 +0000 UTC` form; zone-less values are UTC.
    pub fn parse_timestamp(input: &str) -> ParseResult<DateTime<Utc>> {
        let input = input.trim();

        if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
            return Ok(ts.with_timezone(&Utc));
        }

        // Drop a trailing zone abbreviation ("UTC", "PST") after the offset
        let fields: Vec<&str> = input.split_whitespace().collect();
        if fields.len() >= 3 {
            let with_offset = fields[..3].join(" ");
            if let Ok(ts) = DateTime::parse_from_str(&with_offset, "%Y-%m-%d %H:%M:%S%.f %z") {
                return Ok(ts.with_timezone(&Utc));
            }
        }

        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
                return Ok(naive.and_utc());
            }
        }

        Err(ParseError::InvalidTimestamp(input.to_string()))
    }

    fn parse_component(num: &str, input: &str) -> ParseResult<f64> {
        num.parse::<f64>().map_err(|_| {
            ParseError::ParseDurationError(format!(
                "Invalid number '{}' in duration '{}'",
                num, input
            ))
        })
    }
}

// ============================================================================
// Cached Duration Parser
// ============================================================================

/// Duration parser memoized by exact input string
///
/// Unparseable input yields `0.0`; only successful parses are cached.
#[derive(Debug)]
pub struct DurationParser {
    cache: BoundedCache<String, f64>,
}

impl DurationParser {
    pub fn new(capacity: usize) -> Self {
        Self { cache: BoundedCache::new(capacity) }
    }

    /// Duration in ms, `0.0` when empty or unparseable
    pub fn parse_ms(&mut self, input: &str) -> f64 {
        if let Some(ms) = self.cache.get(input) {
            return *ms;
        }

        match ValueParser::parse_duration_ms(input) {
            Ok(ms) => {
                self.cache.insert(input.to_string(), ms);
                ms
            },
            Err(_) => 0.0,
        }
    }

    /// Same as [`parse_ms`](Self::parse_ms) for a raw stats value
    pub fn parse_value_ms(&mut self, value: &serde_json::Value) -> f64 {
        match value {
            serde_json::Value::String(s) => self.parse_ms(s),
            other => ValueParser::parse_duration_value(other).unwrap_or(0.0),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_parse_single_units() {
        assert!(approx(ValueParser::parse_duration_ms("681.413039ms").unwrap(), 681.413039));
        assert!(approx(ValueParser::parse_duration_ms("250ns").unwrap(), 0.00025));
        assert!(approx(ValueParser::parse_duration_ms("146.266µs").unwrap(), 0.146266));
        assert!(approx(ValueParser::parse_duration_ms("146.266μs").unwrap(), 0.146266));
        assert!(approx(ValueParser::parse_duration_ms("12us").unwrap(), 0.012));
    }

    #[test]
    fn test_parse_composite() {
        assert!(approx(ValueParser::parse_duration_ms("1h").unwrap(), 3_600_000.0));
        assert!(approx(ValueParser::parse_duration_ms("4m17.8s").unwrap(), 257_800.0));
        assert!(approx(ValueParser::parse_duration_ms("1h4m17.8s").unwrap(), 3_857_800.0));
        assert!(approx(
            ValueParser::parse_duration_ms("1h4m17.8098098s").unwrap(),
            3_857_809.8098
        ));
        assert!(approx(ValueParser::parse_duration_ms("2.5s").unwrap(), 2_500.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ValueParser::parse_duration_ms("").is_err());
        assert!(ValueParser::parse_duration_ms("   ").is_err());
        assert!(ValueParser::parse_duration_ms("fast").is_err());
        assert!(ValueParser::parse_duration_ms("10 ms").is_err());
        assert!(ValueParser::parse_duration_ms("5d").is_err());
    }

    #[test]
    fn test_parse_duration_value_numbers_are_ms() {
        let ms = ValueParser::parse_duration_value(&serde_json::json!(12.5)).unwrap();
        assert!(approx(ms, 12.5));
        assert!(ValueParser::parse_duration_value(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn test_parse_timestamps() {
        let go_style = ValueParser::parse_timestamp("2024-03-12 10:15:30.123456789 +0000 UTC").unwrap();
        assert_eq!(go_style.to_rfc3339(), "2024-03-12T10:15:30.123456789+00:00");

        let offset = ValueParser::parse_timestamp("2024-03-12 12:15:30.5 +0200 CEST").unwrap();
        assert_eq!(offset.timestamp(), go_style.timestamp());

        let rfc = ValueParser::parse_timestamp("2024-03-12T10:15:30Z").unwrap();
        assert_eq!(rfc.timestamp(), go_style.timestamp());

        let naive = ValueParser::parse_timestamp("2024-03-12 10:15:30").unwrap();
        assert_eq!(naive.timestamp(), go_style.timestamp());

        assert!(matches!(
            ValueParser::parse_timestamp("yesterday"),
            Err(ParseError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_cached_parser_degrades_to_zero() {
        let mut parser = DurationParser::new(16);
        assert_eq!(parser.parse_ms(""), 0.0);
        assert_eq!(parser.parse_ms("garbage"), 0.0);
        assert_eq!(parser.cached_entries(), 0);

        assert!(approx(parser.parse_ms("3ms"), 3.0));
        assert!(approx(parser.parse_ms("3ms"), 3.0));
        assert_eq!(parser.cached_entries(), 1);
    }
}
