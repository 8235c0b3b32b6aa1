//! JSON-RPC transport to a bitcoind backend.
//!
//! This module performs exactly one request/response exchange at a time against a
//! node's HTTP RPC port. It knows nothing about which methods are allowed; that is
//! the job of [`crate::validator`], and it is never invoked concurrently; that is
//! guaranteed by the owning [`crate::worker`].
//!
//! # Wire format
//!
//! Requests are posted as `{"id": <u64>, "method": <string>, "params": <array>}`
//! with HTTP basic authentication. Replies are decoded from
//! `{"id", "method", "result", "error"}`.
//!
//! # Status handling
//!
//! - `200 OK` - body decoded into a [`WireReply`]; a non-null `error` becomes an
//!   [`Outcome::BusinessError`]
//! - `401 Unauthorized` - [`TransportError::AccessDenied`]
//! - anything else - [`TransportError::HttpFailure`] carrying the status line
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use url::Url;
//! use bitcoind_relay::rpc::{Credentials, RpcTransport, build_http_client};
//!
//! # async fn example() -> Result<(), anyhow::Error> {
//! let client = build_http_client(Duration::from_secs(30), None)?;
//! let mut transport = RpcTransport::new(
//!     Url::parse("http://127.0.0.1:8332")?,
//!     Credentials::new("rpcuser", "rpcpassword"),
//!     client,
//! );
//!
//! let reply = transport.call("getblockcount", &[]).await?;
//! println!("{:?}", reply.into_result());
//! # Ok(())
//! # }
//! ```

mod error;
mod transport;
mod types;

pub use error::TransportError;
pub use transport::{DEFAULT_TIMEOUT_SECS, RpcTransport, TlsConfig, build_http_client};
pub use types::{Credentials, Outcome, WireReply, WireRequest};
