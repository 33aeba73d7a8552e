//! Session configuration: endpoints, header bundle, timeouts.
//!
//! Provides the configuration consumed by the conversation handshake and
//! the stream channel. Defaults target the production provider endpoints
//! and impersonate an Edge-on-Windows browser fingerprint; the handshake
//! endpoint can be overridden via the `CONVERSATION_ENDPOINT` environment
//! variable.
//!
//! # Example
//!
//! ```ignore
//! use sydney_chat::SessionConfig;
//!
//! let config = SessionConfig::from_env()?
//!     .with_request_timeout(std::time::Duration::from_secs(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Default conversation-creation endpoint.
pub const DEFAULT_CONVERSATION_ENDPOINT: &str =
    "https://edgeservices.bing.com/edgesvc/turing/conversation/create";

/// Default stream endpoint base (before the access-token query parameter).
pub const DEFAULT_STREAM_ENDPOINT: &str = "wss://sydney.bing.com/sydney/ChatHub";

/// Environment variable overriding the conversation endpoint.
pub const CONVERSATION_ENDPOINT_ENV: &str = "CONVERSATION_ENDPOINT";

/// Default timeout for the handshake HTTP request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SessionConfig
// ============================================================================

/// Configuration for creating a session.
///
/// Carries the handshake endpoint, the stream endpoint base, the HTTP
/// request timeout, and the fixed fingerprint header bundle sent with the
/// handshake request.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Conversation-creation endpoint.
    pub conversation_url: Url,

    /// Stream endpoint base; the session appends `sec_access_token`.
    pub stream_url: Url,

    /// Timeout for the handshake HTTP request.
    pub request_timeout: Duration,

    /// Fixed header bundle for the handshake request.
    pub headers: Vec<(String, String)>,
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionConfig {
    /// Creates a configuration from defaults and the environment.
    ///
    /// Reads `CONVERSATION_ENDPOINT` to override the handshake endpoint.
    /// A fresh client-request id and forwarded-for address are generated
    /// per configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Url`] if an endpoint fails to parse.
    pub fn from_env() -> Result<Self> {
        let endpoint = env::var(CONVERSATION_ENDPOINT_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_CONVERSATION_ENDPOINT.to_string());

        Self::with_endpoint(&endpoint)
    }

    /// Creates a configuration with an explicit conversation endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Url`] if an endpoint fails to parse.
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Ok(Self {
            conversation_url: Url::parse(endpoint)?,
            stream_url: Url::parse(DEFAULT_STREAM_ENDPOINT)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            headers: default_headers(),
        })
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionConfig {
    /// Sets the handshake request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the stream endpoint base.
    #[inline]
    #[must_use]
    pub fn with_stream_url(mut self, url: Url) -> Self {
        self.stream_url = url;
        self
    }

    /// Replaces a header value, appending the header if absent.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.headers.push((name, value)),
        }
        self
    }
}

// ============================================================================
// Header Bundle
// ============================================================================

/// Builds the fixed fingerprint header bundle.
///
/// The bundle impersonates Microsoft Edge on Windows; `x-ms-client-request-id`
/// is a fresh UUID and `x-forwarded-for` a spoofed address from the
/// provider's own 13.104.0.0/14 range.
fn default_headers() -> Vec<(String, String)> {
    let request_id = Uuid::new_v4();

    [
        ("accept", "application/json"),
        ("accept-language", "en-US,en;q=0.9"),
        ("content-type", "application/json"),
        (
            "sec-ch-ua",
            "\"Not_A Brand\";v=\"99\", \"Microsoft Edge\";v=\"110\", \"Chromium\";v=\"110\"",
        ),
        ("sec-ch-ua-arch", "\"x86\""),
        ("sec-ch-ua-bitness", "\"64\""),
        ("sec-ch-ua-full-version", "\"109.0.1518.78\""),
        (
            "sec-ch-ua-full-version-list",
            "\"Chromium\";v=\"110.0.5481.192\", \"Not A(Brand\";v=\"24.0.0.0\", \"Microsoft Edge\";v=\"110.0.1587.69\"",
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-model", ""),
        ("sec-ch-ua-platform", "\"Windows\""),
        ("sec-ch-ua-platform-version", "\"15.0.0\""),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        (
            "x-ms-useragent",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36 Edg/116.0.1938.81",
        ),
        (
            "Referer",
            "https://www.bing.com/search?q=Bing+AI&showconv=1&FORM=hpcodx",
        ),
        ("Referrer-Policy", "origin-when-cross-origin"),
    ]
    .into_iter()
    .map(|(n, v)| (n.to_string(), v.to_string()))
    .chain([
        ("x-ms-client-request-id".to_string(), request_id.to_string()),
        ("x-forwarded-for".to_string(), spoofed_forwarded_for()),
    ])
    .collect()
}

/// Picks a forwarded-for address from `13.104.0.0` – `13.107.255.255`.
///
/// Octets are derived from UUID randomness; no dedicated RNG dependency.
fn spoofed_forwarded_for() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!("13.{}.{}.{}", 104 + (bytes[0] % 4), bytes[1], bytes[2])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let config = SessionConfig::with_endpoint(DEFAULT_CONVERSATION_ENDPOINT).expect("config");
        assert_eq!(
            config.conversation_url.as_str(),
            DEFAULT_CONVERSATION_ENDPOINT
        );
        assert_eq!(config.stream_url.as_str(), DEFAULT_STREAM_ENDPOINT);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(SessionConfig::with_endpoint("not a url").is_err());
    }

    #[test]
    fn test_header_bundle_contents() {
        let config = SessionConfig::with_endpoint(DEFAULT_CONVERSATION_ENDPOINT).expect("config");
        let names: Vec<&str> = config.headers.iter().map(|(n, _)| n.as_str()).collect();

        assert!(names.contains(&"accept"));
        assert!(names.contains(&"sec-ch-ua-platform"));
        assert!(names.contains(&"x-ms-client-request-id"));
        assert!(names.contains(&"x-forwarded-for"));
        assert!(names.contains(&"Referer"));
    }

    #[test]
    fn test_forwarded_for_range() {
        for _ in 0..64 {
            let addr = spoofed_forwarded_for();
            let octets: Vec<u16> = addr.split('.').map(|o| o.parse().unwrap()).collect();
            assert_eq!(octets[0], 13);
            assert!((104..=107).contains(&octets[1]));
            assert!(octets[2] <= 255);
            assert!(octets[3] <= 255);
        }
    }

    #[test]
    fn test_with_header_replaces() {
        let config = SessionConfig::with_endpoint(DEFAULT_CONVERSATION_ENDPOINT)
            .expect("config")
            .with_header("accept", "text/plain")
            .with_header("x-custom", "1");

        let accept = config
            .headers
            .iter()
            .filter(|(n, _)| n == "accept")
            .collect::<Vec<_>>();
        assert_eq!(accept.len(), 1);
        assert_eq!(accept[0].1, "text/plain");
        assert!(config.headers.iter().any(|(n, v)| n == "x-custom" && v == "1"));
    }

    #[test]
    fn test_with_request_timeout() {
        let config = SessionConfig::with_endpoint(DEFAULT_CONVERSATION_ENDPOINT)
            .expect("config")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
