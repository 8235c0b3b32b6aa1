//! Opening, checking and closing one backend connection.
//!
//! [`BackendConnection::open`] refuses to hand out a connection unless the node is on
//! the expected chain and new enough. Only then does it start the
//! [`CallWorker`](crate::worker) that serialises every later call. Each connection
//! owns its own queue, so connections to different nodes or chains coexist freely.

use std::time::Duration;

use log::{debug, error, info};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use crate::{
    log::mask_string,
    relay::{RelayClient, RetryConfig},
    rpc::{Credentials, DEFAULT_TIMEOUT_SECS, RpcTransport, TlsConfig, TransportError, build_http_client},
    worker::CallWorker,
};

/// Oldest bitcoind accepted by default (0.9.2).
pub const DEFAULT_MINIMUM_VERSION: u64 = 90200;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid bitcoin chain: expected {expected}, node reports {actual}")]
    InvalidChain { expected: String, actual: String },

    #[error("invalid bitcoin version: {actual} is older than the minimum {minimum}")]
    InvalidVersion { minimum: u64, actual: u64 },

    #[error("{method} returned an RPC error: {error}")]
    Rpc { method: &'static str, error: Value },

    #[error("Unexpected {method} reply: {source}")]
    MalformedReply {
        method: &'static str,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything needed to open a connection to one node.
#[derive(Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub credentials: Credentials,
    pub expected_chain: String,
    pub minimum_version: u64,
    pub tls: Option<TlsConfig>,
    pub request_timeout: Duration,
    pub queue_capacity: usize,
    pub retry: RetryConfig,
}

impl BackendConfig {
    pub fn new(url: Url, credentials: Credentials, expected_chain: impl Into<String>) -> Self {
        Self {
            url,
            credentials,
            expected_chain: expected_chain.into(),
            minimum_version: DEFAULT_MINIMUM_VERSION,
            tls: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    chain: String,
    #[serde(default)]
    blocks: u64,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    version: u64,
    blocks: u64,
}

#[derive(Debug, Deserialize)]
struct NetworkInfo {
    version: u64,
}

/// Chain, version and height reported by the node while opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub chain: String,
    pub version: u64,
    pub blocks: u64,
}

/// A checked, running link to one node.
///
/// Call [`close`](BackendConnection::close) to stop the worker and wait for it. Dropping
/// the connection without closing only signals the worker to stop.
pub struct BackendConnection {
    client: RelayClient,
    status: NodeStatus,
    height: watch::Receiver<u64>,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
    _stop_on_drop: DropGuard,
}

impl BackendConnection {
    pub async fn open(config: BackendConfig) -> Result<Self, ConnectError> {
        info!(
            url:% = config.url,
            username = &*mask_string(&config.credentials.username),
            chain = &*config.expected_chain;
            "Connecting to backend"
        );

        let client = build_http_client(config.request_timeout, config.tls.as_ref())?;
        let mut transport = RpcTransport::new(config.url.clone(), config.credentials.clone(), client);

        let status = check_node(&mut transport, &config.expected_chain, config.minimum_version).await?;
        info!(
            chain = &*status.chain,
            version = status.version,
            blocks = status.blocks;
            "Backend passed compatibility checks"
        );

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (height_tx, height_rx) = watch::channel(status.blocks);
        let shutdown = CancellationToken::new();

        let worker = CallWorker::new(transport, queue_rx, shutdown.clone(), height_tx);
        let worker = tokio::spawn(worker.run());

        Ok(Self {
            client: RelayClient::new(queue_tx, shutdown.clone(), config.retry),
            status,
            height: height_rx,
            _stop_on_drop: shutdown.clone().drop_guard(),
            shutdown,
            worker,
        })
    }

    /// Handle for relaying calls through this connection.
    pub fn client(&self) -> RelayClient {
        self.client.clone()
    }

    /// What the node reported when the connection was opened.
    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    /// Most recent block height seen by the worker.
    pub fn latest_height(&self) -> u64 {
        *self.height.borrow()
    }

    /// Stops accepting calls and waits until the worker has exited.
    ///
    /// Calls still queued are answered with [`RelayError::Closed`](crate::RelayError::Closed).
    pub async fn close(self) {
        info!("Closing backend connection");
        self.shutdown.cancel();

        if let Err(e) = self.worker.await {
            error!(error:% = e; "Call worker terminated abnormally");
        }
    }
}

/// Verifies chain and version with trusted, unvalidated calls.
pub async fn check_node(
    transport: &mut RpcTransport,
    expected_chain: &str,
    minimum_version: u64,
) -> Result<NodeStatus, ConnectError> {
    let blockchain: BlockchainInfo = trusted_call(transport, "getblockchaininfo").await?;
    if blockchain.chain != expected_chain {
        return Err(ConnectError::InvalidChain {
            expected: expected_chain.to_string(),
            actual: blockchain.chain,
        });
    }

    let (version, blocks) = match trusted_call::<NodeInfo>(transport, "getinfo").await {
        Ok(info) => (info.version, info.blocks),
        Err(ConnectError::Rpc { error, .. }) => {
            debug!(error:% = error; "getinfo unsupported, falling back to getnetworkinfo");
            network_version(transport, blockchain.blocks).await?
        },
        Err(ConnectError::Transport(e)) if e.is_not_found() => {
            debug!("getinfo not served, falling back to getnetworkinfo");
            network_version(transport, blockchain.blocks).await?
        },
        Err(e) => return Err(e),
    };

    if version < minimum_version {
        return Err(ConnectError::InvalidVersion {
            minimum: minimum_version,
            actual: version,
        });
    }

    Ok(NodeStatus {
        chain: blockchain.chain,
        version,
        blocks,
    })
}

async fn network_version(transport: &mut RpcTransport, blocks: u64) -> Result<(u64, u64), ConnectError> {
    let network: NetworkInfo = trusted_call(transport, "getnetworkinfo").await?;
    Ok((network.version, blocks))
}

async fn trusted_call<T: DeserializeOwned>(
    transport: &mut RpcTransport,
    method: &'static str,
) -> Result<T, ConnectError> {
    let result = transport
        .call(method, &[])
        .await?
        .into_result()
        .map_err(|error| ConnectError::Rpc { method, error })?;

    serde_json::from_value(result).map_err(|source| ConnectError::MalformedReply { method, source })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::body_partial_json;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{RelayError, rpc::Outcome};

    fn reply(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"result": result, "error": null}))
    }

    async fn mount(server: &MockServer, method: &str, response: ResponseTemplate) {
        Mock::given(body_partial_json(json!({"method": method})))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn config(server: &MockServer, chain: &str) -> BackendConfig {
        BackendConfig::new(
            Url::parse(&server.uri()).unwrap(),
            Credentials::new("relay", "secret"),
            chain,
        )
    }

    #[tokio::test]
    async fn test_open_caches_status() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "getblockchaininfo", reply(json!({"chain": "regtest", "blocks": 101}))).await;
        mount(&mock_server, "getinfo", reply(json!({"version": 130200, "blocks": 102}))).await;

        let connection = BackendConnection::open(config(&mock_server, "regtest")).await.unwrap();

        assert_eq!(
            connection.status(),
            &NodeStatus {
                chain: "regtest".into(),
                version: 130200,
                blocks: 102
            }
        );
        assert_eq!(connection.latest_height(), 102);
        connection.close().await;
    }

    #[tokio::test]
    async fn test_chain_mismatch_fails_before_version_check() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "getblockchaininfo", reply(json!({"chain": "main", "blocks": 1}))).await;
        Mock::given(body_partial_json(json!({"method": "getinfo"})))
            .respond_with(reply(json!({"version": 130200, "blocks": 1})))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = BackendConnection::open(config(&mock_server, "regtest")).await.err().unwrap();
        assert!(matches!(
            err,
            ConnectError::InvalidChain { ref expected, ref actual } if expected == "regtest" && actual == "main"
        ));
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_old_version_rejected() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "getblockchaininfo", reply(json!({"chain": "test", "blocks": 1}))).await;
        mount(&mock_server, "getinfo", reply(json!({"version": 90100, "blocks": 1}))).await;

        let err = BackendConnection::open(config(&mock_server, "test")).await.err().unwrap();
        assert!(matches!(
            err,
            ConnectError::InvalidVersion {
                minimum: DEFAULT_MINIMUM_VERSION,
                actual: 90100
            }
        ));
    }

    #[tokio::test]
    async fn test_falls_back_to_getnetworkinfo() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "getblockchaininfo", reply(json!({"chain": "main", "blocks": 850000}))).await;
        mount(&mock_server, "getinfo", ResponseTemplate::new(404)).await;
        mount(&mock_server, "getnetworkinfo", reply(json!({"version": 270000}))).await;

        let connection = BackendConnection::open(config(&mock_server, "main")).await.unwrap();

        assert_eq!(connection.status().version, 270000);
        assert_eq!(connection.latest_height(), 850000);
        connection.close().await;
    }

    #[tokio::test]
    async fn test_fallback_on_rpc_error() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "getblockchaininfo", reply(json!({"chain": "main", "blocks": 5}))).await;
        mount(
            &mock_server,
            "getinfo",
            ResponseTemplate::new(200).set_body_json(json!({
                "result": null,
                "error": {"code": -32601, "message": "Method not found"}
            })),
        )
        .await;
        mount(&mock_server, "getnetworkinfo", reply(json!({"version": 80000}))).await;

        let err = BackendConnection::open(config(&mock_server, "main")).await.err().unwrap();
        assert!(matches!(err, ConnectError::InvalidVersion { actual: 80000, .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "getblockchaininfo", ResponseTemplate::new(401)).await;

        let err = BackendConnection::open(config(&mock_server, "main")).await.err().unwrap();
        assert!(matches!(err, ConnectError::Transport(TransportError::AccessDenied)));
    }

    #[tokio::test]
    async fn test_close_stops_processing() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "getblockchaininfo", reply(json!({"chain": "regtest", "blocks": 0}))).await;
        mount(&mock_server, "getinfo", reply(json!({"version": 90200, "blocks": 0}))).await;
        mount(&mock_server, "getblockcount", reply(json!(7))).await;

        let connection = BackendConnection::open(config(&mock_server, "regtest")).await.unwrap();
        let client = connection.client();

        let outcome = client.invoke("getblockcount", vec![]).await.unwrap();
        assert!(matches!(outcome, Outcome::Result(v) if v == json!(7)));
        assert_eq!(connection.latest_height(), 7);

        connection.close().await;

        assert!(matches!(client.invoke("getblockcount", vec![]).await, Err(RelayError::Closed)));
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
    }
}
