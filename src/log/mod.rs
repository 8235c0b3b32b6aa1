pub mod key_value_encoder;

use std::path::Path;
use std::sync::OnceLock;

use log::{debug, info};
use log4rs::{
    Config,
    config::{Deserializers, RawConfig},
};

use crate::log::key_value_encoder::KeyValueEncoderDeserializer;

const EXTERNAL_CONFIG: &str = "log4rs.yml";
const KEY_VALUE_ENCODER: &str = "key_value_console";

/// Sets up log4rs for the relay binary.
///
/// Reads `log4rs.yml` from the working directory when present, otherwise falls back
/// to the stderr-only configuration compiled into the binary. Panics if the chosen
/// configuration is unusable.
pub fn init_logging() {
    let path = Path::new(EXTERNAL_CONFIG);
    if path.exists() {
        if let Err(e) = log4rs::init_file(path, relay_deserializers()) {
            panic!("Unusable {}: {}", EXTERNAL_CONFIG, e);
        }
        info!(path = EXTERNAL_CONFIG; "Logging configured from file");
        return;
    }

    let config = match embedded_config() {
        Ok(config) => config,
        Err(e) => panic!("Embedded logging configuration is broken: {:#}", e),
    };
    if let Err(e) = log4rs::init_config(config) {
        panic!("Could not install logger: {}", e);
    }
    debug!("Logging configured from embedded defaults");
}

fn relay_deserializers() -> Deserializers {
    let mut deserializers = Deserializers::default();
    deserializers.insert(KEY_VALUE_ENCODER, KeyValueEncoderDeserializer);
    deserializers
}

fn embedded_config() -> anyhow::Result<Config> {
    let raw: RawConfig = serde_yaml::from_str(include_str!("../../resources/default_log4rs.yml"))?;

    let (appenders, errors) = raw.appenders_lossy(&relay_deserializers());
    if !errors.is_empty() {
        anyhow::bail!("appender errors: {:?}", errors);
    }

    Ok(Config::builder()
        .appenders(appenders)
        .loggers(raw.loggers())
        .build(raw.root())?)
}

/// `REVEAL_PII=1` (or `true`) turns masking off, read once per process.
fn reveal_pii() -> bool {
    static REVEAL: OnceLock<bool> = OnceLock::new();

    *REVEAL.get_or_init(|| {
        std::env::var("REVEAL_PII")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false)
    })
}

/// Masks an identifier such as an RPC username, keeping only its first and last characters.
/// If REVEAL_PII is true, returns the original string.
pub fn mask_string(s: &str) -> String {
    if reveal_pii() {
        return s.to_string();
    }

    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }

    format!("{}***{}", chars[0], chars[chars.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_string() {
        if reveal_pii() {
            return;
        }
        assert_eq!(mask_string("rpc"), "***");
        assert_eq!(mask_string("rpcuser"), "r***r");
        assert_eq!(mask_string("bitmärk"), "b***k");
    }

    #[test]
    fn test_embedded_config_builds() {
        let config = embedded_config().unwrap();

        assert_eq!(config.appenders().len(), 1);
        assert!(config.loggers().iter().any(|l| l.name() == "bitcoind_relay"));
    }
}
