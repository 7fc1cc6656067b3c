//! Error types for the Hetzner Cloud client.

use thiserror::Error;

/// Errors raised by [`super::HcloudClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HcloudError {
    /// Raised when the client cannot be constructed from its settings.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the API answers with a non-success status.
    #[error("hcloud API error {status} ({code}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from the response body, or `unknown`.
        code: String,
        /// Error message from the response body.
        message: String,
    },
    /// Raised when the request never produced a response.
    #[error("provider error: {message}")]
    Provider {
        /// Transport error description.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode {context} response: {message}")]
    Decode {
        /// Operation whose response failed to decode.
        context: &'static str,
        /// Decoder message.
        message: String,
    },
}

impl From<reqwest::Error> for HcloudError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}
