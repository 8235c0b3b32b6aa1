use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TransportError;

/// Request envelope posted to bitcoind.
#[derive(Debug, Serialize)]
pub struct WireRequest<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
}

/// Reply envelope returned by bitcoind.
///
/// `result` and `error` are mutually exclusive; a missing field decodes as `null`.
#[derive(Debug, Deserialize)]
pub struct WireReply {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Value,
}

impl WireReply {
    /// Splits the reply into the success payload or the node's own error.
    ///
    /// A non-null `error` always wins, whatever `result` holds.
    pub fn into_result(self) -> Result<Value, Value> {
        if self.error.is_null() {
            Ok(self.result)
        } else {
            Err(self.error)
        }
    }
}

/// The three ways a relayed call can end once it reached the backend.
///
/// Only [`TransportError`](Outcome::TransportError) is ever retried. A
/// [`BusinessError`](Outcome::BusinessError) is the node's authoritative answer
/// and is passed through verbatim.
#[derive(Debug)]
pub enum Outcome {
    /// Raw `result` payload of a successful call.
    Result(Value),
    /// Raw `error` payload reported by the node.
    BusinessError(Value),
    /// The exchange itself failed.
    TransportError(TransportError),
}

impl Outcome {
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Outcome::TransportError(_))
    }
}

impl From<Result<WireReply, TransportError>> for Outcome {
    fn from(exchange: Result<WireReply, TransportError>) -> Self {
        match exchange.map(WireReply::into_result) {
            Ok(Ok(result)) => Outcome::Result(result),
            Ok(Err(error)) => Outcome::BusinessError(error),
            Err(e) => Outcome::TransportError(e),
        }
    }
}

/// Basic-auth credentials for the backend.
///
/// The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}
