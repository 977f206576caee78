//! Cloud error taxonomy (spec §7), as real enum variants rather than
//! stringly-typed errors so callers can match on failure class instead
//! of parsing messages.

use hvac_core::retry::Classification;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudError {
    /// No valid access token and refresh failed or was never attempted.
    /// Reads degrade to empty results; writes fail immediately, no retry.
    #[error("not authenticated with the cloud")]
    Unauthenticated,

    /// Operation targeted a device id the cloud doesn't recognize.
    #[error("device not found: {0}")]
    NotFound(String),

    /// Classified transient: network-layer failure, HTTP 429, or 5xx.
    #[error("transient cloud failure: {0}")]
    Transient(String),

    /// Classified permanent: any other non-2xx response.
    #[error("cloud request failed with status {status}: {body}")]
    Permanent { status: u16, body: String },

    #[error("cloud request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl CloudError {
    /// Classification for use as the `classify` closure passed to
    /// [`hvac_core::retry::RetryPolicy::run`].
    pub fn classification(&self) -> Classification {
        match self {
            CloudError::Transient(_) => Classification::Transient,
            CloudError::Request(err) => {
                if err.is_timeout() || err.is_connect() || err.is_request() {
                    Classification::Transient
                } else {
                    Classification::Permanent
                }
            }
            CloudError::Unauthenticated | CloudError::NotFound(_) | CloudError::Permanent { .. } => {
                Classification::Permanent
            }
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.as_u16() == 404 {
            CloudError::NotFound(body)
        } else if status.as_u16() == 429 || status.is_server_error() {
            CloudError::Transient(format!("{status}: {body}"))
        } else {
            CloudError::Permanent { status: status.as_u16(), body }
        }
    }
}
