//! HTTP client factory with consistent timeout configuration.
//!
//! Gateway clients are built here rather than constructing `reqwest::Client`
//! directly, so every outbound call carries connect and request timeouts.

use reqwest::Client;
use std::time::Duration;

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build an HTTP client whose request timeout is `request_timeout`.
///
/// The lifecycle manager applies the same bound per call; this one also
/// covers the response body read.
pub fn try_build_client_with_timeout(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()
}
