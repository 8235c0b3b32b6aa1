//! Error types for the backend JSON-RPC transport.
//!
//! Everything in [`TransportError`] is a failure of the exchange itself, never a
//! verdict from the node. Errors reported by bitcoind inside a well-formed reply
//! are carried as [`Outcome::BusinessError`](crate::Outcome::BusinessError) instead.

use reqwest::StatusCode;
use thiserror::Error;

/// Failures of a single request/response exchange with the backend.
///
/// All variants are retryable from the relay's point of view. Callers that see
/// [`AccessDenied`](TransportError::AccessDenied) repeatedly should treat it as a
/// credential misconfiguration rather than a network glitch.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request could not be completed.
    ///
    /// Connection refused, DNS failure, TLS handshake errors, the request
    /// timeout elapsing and truncated bodies all end up here.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The node rejected the basic-auth credentials (HTTP 401).
    #[error("Access denied")]
    AccessDenied,

    /// The node answered with a status other than 200 or 401.
    #[error("HTTP failed: {status}")]
    HttpFailure {
        /// Status line returned by the node, e.g. `500 Internal Server Error`.
        status: StatusCode,
    },

    /// The request could not be encoded, or a 200 reply could not be decoded.
    #[error("Incomprehensible response: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, TransportError::AccessDenied)
    }

    /// True when the node does not serve the requested method at all.
    ///
    /// bitcoind answers unknown methods with HTTP 404 rather than a JSON error body.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::HttpFailure { status } if *status == StatusCode::NOT_FOUND)
    }
}
