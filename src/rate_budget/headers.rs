//! Server-reported rate limit state.
//!
//! Riot responses carry the limits that apply to the request and how much of
//! each has been used, as `"<n>:<seconds>"` lists:
//!
//! ```text
//! X-App-Rate-Limit: 20:1,100:120
//! X-App-Rate-Limit-Count: 3:1,41:120
//! ```
//!
//! The parsed state is advisory. It can only make the local budget more
//! conservative, and an explicit 429 with `Retry-After` always wins over it.

use std::collections::BTreeMap;

use reqwest::header::HeaderMap;

/// Generic limit header.
pub const RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
/// Generic usage header matching [`RATE_LIMIT_LIMIT`].
pub const RATE_LIMIT_COUNT: &str = "x-rate-limit-count";
/// Riot application (API key wide) limit header.
pub const APP_RATE_LIMIT: &str = "x-app-rate-limit";
/// Riot application usage header.
pub const APP_RATE_LIMIT_COUNT: &str = "x-app-rate-limit-count";
/// Which limit a 429 was issued for: `application`, `method` or `service`.
pub const RATE_LIMIT_TYPE: &str = "x-rate-limit-type";
/// Seconds to wait after a 429.
pub const RETRY_AFTER: &str = "retry-after";

/// Limit and usage the server reported for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedWindow {
    pub limit: u32,
    pub used: u32,
}

impl ObservedWindow {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Window length in seconds mapped to the server's view of that window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerThrottleState {
    windows: BTreeMap<u64, ObservedWindow>,
}

impl ServerThrottleState {
    /// Builds the state from a limit list and a count list.
    ///
    /// Malformed entries are skipped. Returns `None` when no window has both a
    /// limit and a count.
    pub fn parse(limit: &str, count: &str) -> Option<Self> {
        let limits = parse_pairs(limit);
        let counts = parse_pairs(count);
        let windows: BTreeMap<u64, ObservedWindow> = limits
            .into_iter()
            .filter_map(|(seconds, limit)| {
                counts
                    .get(&seconds)
                    .map(|&used| (seconds, ObservedWindow { limit, used }))
            })
            .collect();
        if windows.is_empty() {
            None
        } else {
            Some(ServerThrottleState { windows })
        }
    }

    /// Reads the application headers if present, otherwise the generic pair.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        [
            (APP_RATE_LIMIT, APP_RATE_LIMIT_COUNT),
            (RATE_LIMIT_LIMIT, RATE_LIMIT_COUNT),
        ]
        .into_iter()
        .find_map(|(limit, count)| {
            let limit = headers.get(limit)?.to_str().ok()?;
            let count = headers.get(count)?.to_str().ok()?;
            Self::parse(limit, count)
        })
    }

    pub fn get(&self, seconds: u64) -> Option<ObservedWindow> {
        self.windows.get(&seconds).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, ObservedWindow)> + '_ {
        self.windows.iter().map(|(&seconds, &window)| (seconds, window))
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Which limit a 429 applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// The API key as a whole. Every request shares this limit.
    Application,
    /// A single endpoint.
    Method,
    /// The upstream service itself, not attributable to this key.
    Service,
}

impl RateLimitScope {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(RATE_LIMIT_TYPE)?.to_str().ok()?;
        match value.trim().to_ascii_lowercase().as_str() {
            "application" => Some(RateLimitScope::Application),
            "method" => Some(RateLimitScope::Method),
            "service" => Some(RateLimitScope::Service),
            _ => None,
        }
    }
}

fn parse_pairs(input: &str) -> BTreeMap<u64, u32> {
    input
        .split(',')
        .filter_map(|entry| {
            let (value, seconds) = entry.trim().split_once(':')?;
            let value = value.trim().parse::<u32>().ok()?;
            let seconds = seconds.trim().parse::<u64>().ok()?;
            (seconds > 0).then_some((seconds, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_matching_windows() {
        let state = ServerThrottleState::parse("20:1,100:120", "3:1,41:120").unwrap();
        assert_eq!(state.get(1), Some(ObservedWindow { limit: 20, used: 3 }));
        assert_eq!(state.get(120), Some(ObservedWindow { limit: 100, used: 41 }));
        assert_eq!(state.get(120).unwrap().remaining(), 59);
        assert_eq!(state.iter().count(), 2);
    }

    #[test]
    fn test_parse_skips_malformed_and_unmatched() {
        let state = ServerThrottleState::parse("20:1,junk,100:120,5:0", "3:1").unwrap();
        assert_eq!(state.iter().count(), 1);
        assert!(state.get(120).is_none());

        assert!(ServerThrottleState::parse("", "").is_none());
        assert!(ServerThrottleState::parse("20:1", "3:10").is_none());
    }

    #[test]
    fn test_over_limit_count_has_no_remaining() {
        let window = ObservedWindow { limit: 20, used: 25 };
        assert_eq!(window.remaining(), 0);
    }

    #[test]
    fn test_from_headers_prefers_app_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from_static("10:1"));
        headers.insert(RATE_LIMIT_COUNT, HeaderValue::from_static("1:1"));
        headers.insert(APP_RATE_LIMIT, HeaderValue::from_static("20:1"));
        headers.insert(APP_RATE_LIMIT_COUNT, HeaderValue::from_static("7:1"));

        let state = ServerThrottleState::from_headers(&headers).unwrap();
        assert_eq!(state.get(1), Some(ObservedWindow { limit: 20, used: 7 }));
    }

    #[test]
    fn test_from_headers_generic_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from_static("10:1"));
        headers.insert(RATE_LIMIT_COUNT, HeaderValue::from_static("4:1"));
        let state = ServerThrottleState::from_headers(&headers).unwrap();
        assert_eq!(state.get(1).unwrap().remaining(), 6);

        assert!(ServerThrottleState::from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_scope_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(RateLimitScope::from_headers(&headers), None);

        headers.insert(RATE_LIMIT_TYPE, HeaderValue::from_static("Application"));
        assert_eq!(
            RateLimitScope::from_headers(&headers),
            Some(RateLimitScope::Application)
        );
        headers.insert(RATE_LIMIT_TYPE, HeaderValue::from_static("method"));
        assert_eq!(
            RateLimitScope::from_headers(&headers),
            Some(RateLimitScope::Method)
        );
        headers.insert(RATE_LIMIT_TYPE, HeaderValue::from_static("bogus"));
        assert_eq!(RateLimitScope::from_headers(&headers), None);
    }
}
