pub mod loader;

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::{
    cli::BackendArgs,
    connection::{BackendConfig, DEFAULT_MINIMUM_VERSION, DEFAULT_QUEUE_CAPACITY},
    relay::{DEFAULT_TOTAL_TRIES, RetryConfig},
    rpc::{Credentials, DEFAULT_TIMEOUT_SECS, TlsConfig},
};

pub use loader::load_configuration;

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub backend: BackendSettings,
    pub retry: RetrySettings,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub chain: String,
    pub minimum_version: u64,
    pub request_timeout_secs: u64,
    pub queue_capacity: usize,
    pub tls: Option<TlsSettings>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8332".to_string(),
            username: String::new(),
            password: String::new(),
            chain: "main".to_string(),
            minimum_version: DEFAULT_MINIMUM_VERSION,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub ca_certificate: Option<PathBuf>,
    pub client_certificate: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub total_tries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            total_tries: DEFAULT_TOTAL_TRIES,
            min_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            total_tries: settings.total_tries,
            min_backoff: Duration::from_millis(settings.min_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

impl TlsSettings {
    fn load(&self) -> Result<TlsConfig> {
        let root_certificate = self
            .ca_certificate
            .as_ref()
            .map(|path| fs::read(path).with_context(|| format!("Could not read CA certificate {}", path.display())))
            .transpose()?;

        let identity = match (&self.client_certificate, &self.client_key) {
            (Some(certificate), Some(key)) => Some((
                fs::read(certificate)
                    .with_context(|| format!("Could not read client certificate {}", certificate.display()))?,
                fs::read(key).with_context(|| format!("Could not read client key {}", key.display()))?,
            )),
            (None, None) => None,
            _ => anyhow::bail!("client_certificate and client_key must be set together"),
        };

        Ok(TlsConfig {
            root_certificate,
            identity,
            accept_invalid_certs: self.accept_invalid_certs,
        })
    }
}

impl RelayConfig {
    /// Resolves the settings into what [`BackendConnection::open`](crate::BackendConnection::open) needs.
    pub fn backend_config(&self) -> Result<BackendConfig> {
        let backend = &self.backend;
        let url = Url::parse(&backend.url).with_context(|| format!("Invalid backend url {}", backend.url))?;

        Ok(BackendConfig {
            url,
            credentials: Credentials::new(&backend.username, &backend.password),
            expected_chain: backend.chain.clone(),
            minimum_version: backend.minimum_version,
            tls: backend.tls.as_ref().map(TlsSettings::load).transpose()?,
            request_timeout: Duration::from_secs(backend.request_timeout_secs),
            queue_capacity: backend.queue_capacity,
            retry: RetryConfig::from(&self.retry),
        })
    }
}

/// Command line overrides applied on top of the loaded configuration.
pub trait ApplyArgs {
    fn apply_backend(&mut self, args: &BackendArgs);
}

impl ApplyArgs for RelayConfig {
    fn apply_backend(&mut self, args: &BackendArgs) {
        if let Some(url) = &args.backend_url {
            self.backend.url = url.clone();
        }
        if let Some(chain) = &args.chain {
            self.backend.chain = chain.clone();
        }
        if let Some(total_tries) = args.total_tries {
            self.retry.total_tries = total_tries;
        }
    }
}
