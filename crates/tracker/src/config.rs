use std::time::Duration;

use pointdown_core::config::TaskPollConfig;
use pointdown_core::retry::RetryPolicy;

use crate::error::TrackerError;

/// Per-request timeout for a single HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Attempts (including the first) for a call failing transiently.
pub const TRANSPORT_MAX_ATTEMPTS: u32 = 4;

/// Backoff before the first transport retry; doubles per attempt.
pub const TRANSPORT_INITIAL_BACKOFF_MS: u64 = 500;

/// Upper bound on the transport backoff.
pub const TRANSPORT_MAX_BACKOFF_SECS: u64 = 8;

/// Random extra wait added to each transport backoff.
pub const TRANSPORT_JITTER_MS: u64 = 250;

/// Issues requested per search page.
pub const SEARCH_PAGE_SIZE: u32 = 100;

/// Connection settings for a Jira Cloud site.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Site URL, e.g. `https://acme.atlassian.net`. Stored without a trailing slash.
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub request_timeout: Duration,
    /// Policy for network errors, 5xx/429 and malformed bodies.
    pub transport_retry: RetryPolicy,
    pub task_poll: TaskPollConfig,
}

impl TrackerConfig {
    /// Validate credentials and build a config with default timeouts.
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, TrackerError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let email = email.into().trim().to_string();
        let api_token = api_token.into().trim().to_string();

        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(TrackerError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{base_url}'"
            )));
        }
        if email.is_empty() || api_token.is_empty() {
            return Err(TrackerError::InvalidConfig(
                "Email and API token must both be set".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            email,
            api_token,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            transport_retry: default_transport_retry(),
            task_poll: TaskPollConfig::default(),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Exponential backoff with jitter, capped in attempts.
pub fn default_transport_retry() -> RetryPolicy {
    RetryPolicy::exponential(
        Duration::from_millis(TRANSPORT_INITIAL_BACKOFF_MS),
        2.0,
        Duration::from_secs(TRANSPORT_MAX_BACKOFF_SECS),
    )
    .with_jitter(Duration::from_millis(TRANSPORT_JITTER_MS))
    .with_max_attempts(TRANSPORT_MAX_ATTEMPTS)
}
