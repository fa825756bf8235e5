/// Errors from the Jira REST layer.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Jira returned a status the operation does not accept.
    #[error("Jira API error during {operation} ({status}): {body}")]
    Api {
        operation: &'static str,
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("Unexpected response during {operation}: {detail}")]
    Schema {
        operation: &'static str,
        detail: String,
    },

    #[error("Invalid tracker configuration: {0}")]
    InvalidConfig(String),

    /// A transient failure persisted through every transport retry.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        last: Box<TrackerError>,
    },
}

impl TrackerError {
    /// Whether the transport layer should retry the call.
    ///
    /// Network-level failures, server errors, rate limiting and malformed
    /// bodies are transient; client errors and configuration problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Schema { .. } => true,
            Self::InvalidConfig(_) | Self::RetriesExhausted { .. } => false,
        }
    }

    pub(crate) fn schema(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Schema {
            operation,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = TrackerError::Api {
            operation: "write_field",
            status: 400,
            body: "Field 'x' cannot be set".into(),
        };
        assert_eq!(
            err.to_string(),
            "Jira API error during write_field (400): Field 'x' cannot be set"
        );
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        for status in [500, 502, 503, 429] {
            let err = TrackerError::Api {
                operation: "get",
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "{status} should be transient");
        }
    }

    #[test]
    fn client_errors_are_not_transient() {
        for status in [400, 401, 403, 404, 409] {
            let err = TrackerError::Api {
                operation: "get",
                status,
                body: String::new(),
            };
            assert!(!err.is_transient(), "{status} should not be transient");
        }
        assert!(!TrackerError::InvalidConfig("x".into()).is_transient());
    }

    #[test]
    fn schema_errors_are_transient() {
        assert!(TrackerError::schema("fetch_entity", "missing key").is_transient());
    }

    #[test]
    fn request_error_display() {
        // Build a reqwest error from an invalid URL.
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = TrackerError::Request(req_err);
        assert!(err.to_string().contains("HTTP request failed"));
    }
}
