use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub fn build_http_client() -> Client {
    build_http_client_with_timeout(DEFAULT_TIMEOUT_SECS)
}

/// Per-turn client: the caller's own timeout is the only cancellation point
/// once a stream has started.
pub fn build_http_client_with_timeout(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|error| {
            tracing::warn!("falling back to default HTTP client: {error}");
            Client::new()
        })
}
