use std::time::{Duration, Instant};

use log::trace;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use super::error::TransportError;
use super::types::{Credentials, WireReply, WireRequest};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// TLS material for the link to the node, all PEM encoded.
#[derive(Clone, Default)]
pub struct TlsConfig {
    /// Extra root certificate to trust, e.g. a self-signed node certificate.
    pub root_certificate: Option<Vec<u8>>,
    /// Client certificate and PKCS#8 key presented to the node.
    pub identity: Option<(Vec<u8>, Vec<u8>)>,
    /// Skip server certificate verification. Test rigs only.
    pub accept_invalid_certs: bool,
}

/// Builds the HTTP client used for every exchange with one node.
///
/// The timeout set here is the only bound on how long a single relayed call may take.
pub fn build_http_client(timeout: Duration, tls: Option<&TlsConfig>) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().timeout(timeout);

    if let Some(tls) = tls {
        if let Some(pem) = &tls.root_certificate {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        if let Some((certificate, key)) = &tls.identity {
            builder = builder.identity(reqwest::Identity::from_pkcs8_pem(certificate, key)?);
        }
        builder = builder.danger_accept_invalid_certs(tls.accept_invalid_certs);
    }

    builder.build()
}

/// One authenticated JSON-RPC link to bitcoind.
///
/// The link cannot interleave request/response pairs, so `call` takes `&mut self`:
/// whoever owns the transport is the only one talking to the node.
pub struct RpcTransport {
    url: Url,
    credentials: Credentials,
    client: reqwest::Client,
    last_id: u64,
}

impl RpcTransport {
    pub fn new(url: Url, credentials: Credentials, client: reqwest::Client) -> Self {
        Self {
            url,
            credentials,
            client,
            last_id: 0,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Id of the most recent request, 0 before the first one.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Performs one exchange. Ids start at 1 and are never reused.
    pub async fn call(&mut self, method: &str, params: &[Value]) -> Result<WireReply, TransportError> {
        self.last_id += 1;
        let request = WireRequest {
            id: self.last_id,
            method,
            params,
        };
        let body = serde_json::to_vec(&request)?;

        let start = Instant::now();
        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        trace!(
            id = request.id,
            method = method,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64;
            "Backend exchange finished"
        );

        match status {
            StatusCode::OK => Ok(serde_json::from_slice(&body)?),
            StatusCode::UNAUTHORIZED => Err(TransportError::AccessDenied),
            status => Err(TransportError::HttpFailure { status }),
        }
    }
}
