//! Validating JSON-RPC relay in front of a single trusted bitcoind.
//!
//! Callers hand [`RelayClient::invoke`] a method name and raw JSON arguments. The call
//! is queued, checked against a fixed whitelist, executed against the node by a single
//! worker task and answered with an [`Outcome`]. At most one exchange with the node is
//! ever in flight, and only transport failures are retried.
//!
//! ```rust,no_run
//! use bitcoind_relay::{BackendConfig, BackendConnection, Outcome, rpc::Credentials};
//! use serde_json::json;
//! use url::Url;
//!
//! # async fn example() -> Result<(), anyhow::Error> {
//! let config = BackendConfig::new(
//!     Url::parse("http://127.0.0.1:18443")?,
//!     Credentials::new("rpcuser", "rpcpassword"),
//!     "regtest",
//! );
//! let connection = BackendConnection::open(config).await?;
//! let client = connection.client();
//!
//! match client.invoke("getblockhash", vec![json!(0)]).await? {
//!     Outcome::Result(hash) => println!("genesis: {}", hash),
//!     Outcome::BusinessError(error) => println!("node said no: {}", error),
//!     Outcome::TransportError(e) => println!("node unreachable: {}", e),
//! }
//!
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod log;
pub mod relay;
pub mod rpc;
pub mod validator;
mod worker;

pub use crate::connection::{BackendConfig, BackendConnection, ConnectError, NodeStatus};
pub use crate::relay::{RelayClient, RelayError, RetryConfig};
pub use crate::rpc::{Outcome, TransportError};
pub use crate::validator::ValidationError;
