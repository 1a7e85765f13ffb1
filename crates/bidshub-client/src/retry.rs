// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Retry policies with URL-based classification for the BIDS Hub client.
//!
//! Requests fall into two categories with different failure characteristics:
//!
//! - **HubApi**: dataset hub REST calls (`huggingface.co/api/...`). These are
//!   sequential, low-volume, and should fail fast on authentication errors so
//!   the user gets immediate feedback on a bad token.
//! - **FileIO**: shard uploads to presigned storage URLs (S3, CDN) and LFS
//!   transfer endpoints. Multi-gigabyte Parquet shards hit rate limiting and
//!   transient network failures far more often, and every PUT is idempotent,
//!   so these retry aggressively on anything transient.
//!
//! Both scopes share the retry count from `BIDS_HUB_MAX_RETRIES` (default: 3);
//! only the error classification differs. The request timeout comes from
//! `BIDS_HUB_TIMEOUT` (default: 30 seconds) and should be raised for bulk
//! shard uploads:
//!
//! ```bash
//! export BIDS_HUB_MAX_RETRIES=10
//! export BIDS_HUB_TIMEOUT=120
//! ```

use url::Url;

/// Retry scope classification for URL-based retry policies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryScope {
    /// Dataset hub REST API calls under `/api` on the hub host.
    ///
    /// Fail fast on authentication errors, retry server errors and
    /// transient transport failures.
    HubApi,

    /// File upload operations against presigned storage URLs or LFS
    /// transfer endpoints.
    ///
    /// Idempotent PUTs of large shards; retry all transient failures.
    FileIO,
}

/// Classifies a URL to determine which retry policy to apply.
///
/// A URL is `HubApi` when all of the following hold:
///
/// 1. The scheme is HTTP or HTTPS.
/// 2. The host is `huggingface.co` or a subdomain of it.
/// 3. The path is exactly `/api` or starts with `/api/`.
///
/// Everything else, including LFS batch endpoints
/// (`/datasets/<repo>.git/info/lfs/...`) and presigned S3 URLs, is `FileIO`.
/// Self-hosted hub deployments on other hosts also classify as `FileIO`; the
/// only cost is that auth failures against them are retried a few times.
///
/// The host is checked with a proper URL parser, so
/// `https://evil.example/huggingface.co/api` does not spoof the hub host.
///
/// # Examples
///
/// ```rust
/// use bidshub_client::{RetryScope, classify_url};
///
/// assert_eq!(
///     classify_url("https://huggingface.co/api/repos/create"),
///     RetryScope::HubApi
/// );
/// assert_eq!(
///     classify_url("https://hf-hub-lfs.s3.amazonaws.com/shard.parquet"),
///     RetryScope::FileIO
/// );
/// ```
pub fn classify_url(url: &str) -> RetryScope {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return RetryScope::FileIO;
        }

        if let Some(host) = parsed.host_str() {
            let host_matches = host == "huggingface.co" || host.ends_with(".huggingface.co");

            // Path must be exactly "/api" or start with "/api/" (not "/apis")
            let path = parsed.path();
            let path_is_api = path == "/api" || path.starts_with("/api/");

            if host_matches && path_is_api {
                return RetryScope::HubApi;
            }
        }
    }

    RetryScope::FileIO
}

/// Creates a retry policy with URL-based classification.
///
/// ## HubApi
///
/// | HTTP status | Action | Rationale |
/// |-------------|--------|-----------|
/// | 401, 403 | Never retry | Bad or expired token, user action required |
/// | 408, 429 | Retry | Timeout, rate limiting |
/// | 5xx | Retry | Server error, may recover |
/// | Transport error | Retry | Network issues |
///
/// ## FileIO
///
/// | HTTP status | Action | Rationale |
/// |-------------|--------|-----------|
/// | 408, 429 | Retry | Common under storage rate limiting |
/// | 409, 423 | Retry | Storage eventual consistency |
/// | 5xx | Retry | Transient storage errors |
/// | Transport error | Retry | Network issues during long PUTs |
pub fn create_retry_policy() -> reqwest::retry::Builder {
    let max_retries = std::env::var("BIDS_HUB_MAX_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    // Wildcard host scope; the URL inspection happens in classify_fn
    reqwest::retry::for_host("*")
        .max_retries_per_request(max_retries)
        .classify_fn(|req_rep| {
            let url = req_rep.uri().to_string();

            match classify_url(&url) {
                RetryScope::HubApi => match req_rep.status() {
                    Some(status) => match status.as_u16() {
                        401 | 403 => req_rep.success(),
                        429 | 408 | 500..=599 => req_rep.retryable(),
                        _ => req_rep.success(),
                    },
                    None if req_rep.error().is_some() => req_rep.retryable(),
                    None => req_rep.success(),
                },
                RetryScope::FileIO => match req_rep.status() {
                    Some(status) => match status.as_u16() {
                        429 | 408 | 500..=599 | 409 | 423 => req_rep.retryable(),
                        _ => req_rep.success(),
                    },
                    None if req_rep.error().is_some() => req_rep.retryable(),
                    None => req_rep.success(),
                },
            }
        })
}

pub fn log_retry_configuration() {
    let max_retries = std::env::var("BIDS_HUB_MAX_RETRIES").unwrap_or_else(|_| "3".to_string());
    let timeout = std::env::var("BIDS_HUB_TIMEOUT").unwrap_or_else(|_| "30".to_string());
    log::debug!(
        "Retry configuration - max_retries={}, timeout={}s",
        max_retries,
        timeout
    );
}
