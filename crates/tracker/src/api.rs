//! HTTP plumbing shared by every Jira call.
//!
//! [`TrackerApi`] owns the [`reqwest::Client`] and the site configuration.
//! Each operation runs through [`TrackerApi::with_retry`], which retries
//! transient failures with exponential backoff and jitter. This layer is
//! unaware of locks: contention retries live in the sync crate.

use std::future::Future;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use pointdown_core::retry::{retry_until, Attempt, RetryError};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::schema::Myself;

/// HTTP client for a single Jira Cloud site.
pub struct TrackerApi {
    client: reqwest::Client,
    config: TrackerConfig,
    base: Url,
}

impl TrackerApi {
    /// Build a client for `config`.
    ///
    /// Redirects are not followed: bulk property operations answer
    /// `303 See Other` pointing at a task, and that `Location` is the
    /// handle the lock manager polls.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Self::with_client(client, config)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: TrackerConfig) -> Result<Self, TrackerError> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            TrackerError::InvalidConfig(format!("Invalid base URL '{}': {e}", config.base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(TrackerError::InvalidConfig(format!(
                "Base URL '{}' cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            client,
            config,
            base,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The authenticated user. Used to verify credentials.
    pub async fn myself(&self) -> Result<Myself, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "myself"])?;
        let url = &url;
        self.with_retry("myself", || async move {
            let response = self.request(Method::GET, url.clone()).send().await?;
            Self::parse_response("myself", response).await
        })
        .await
    }

    // ---- crate helpers ----

    /// Absolute URL for the given path segments under the site root.
    /// Segments are percent-encoded.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, TrackerError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TrackerError::InvalidConfig("Base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Authenticated request builder.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.config.email, Some(&self.config.api_token))
            .header(ACCEPT, "application/json")
    }

    /// Run `attempt` under the transport retry policy.
    ///
    /// Transient errors (see [`TrackerError::is_transient`]) are retried;
    /// anything else is returned at once. When retries run out the last
    /// error is wrapped in [`TrackerError::RetriesExhausted`].
    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, TrackerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TrackerError>>,
    {
        let result = retry_until(&self.config.transport_retry, |n| {
            let call = attempt();
            async move {
                match call.await {
                    Ok(value) => Ok(Attempt::Done(value)),
                    Err(e) if e.is_transient() => {
                        tracing::warn!(operation, attempt = n, error = %e, "Transient Jira error");
                        Ok(Attempt::Retry(e))
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(RetryError::Aborted(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last, .. }) => {
                let last = last.unwrap_or_else(|| {
                    TrackerError::schema(operation, "retries exhausted without an error")
                });
                tracing::error!(operation, attempts, error = %last, "Jira call failed after all retries");
                Err(TrackerError::RetriesExhausted {
                    operation,
                    attempts,
                    last: Box::new(last),
                })
            }
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TrackerError::Api`]
    /// containing the status and body text on failure.
    pub(crate) async fn ensure_success(
        operation: &'static str,
        response: Response,
    ) -> Result<Response, TrackerError> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(operation, response).await);
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    /// A body that does not match `T` is a [`TrackerError::Schema`].
    pub(crate) async fn parse_response<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, TrackerError> {
        let response = Self::ensure_success(operation, response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TrackerError::schema(operation, e.to_string()))
    }

    /// Consume a failed response into an [`TrackerError::Api`].
    pub(crate) async fn api_error(operation: &'static str, response: Response) -> TrackerError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        TrackerError::Api {
            operation,
            status,
            body,
        }
    }
}
