use std::io;

use log::{
    Record,
    kv::{self, Key, Value, VisitSource},
};
use log4rs::encode::{Color, Encode, Style, Write, pattern::PatternEncoder};
use serde::Deserialize;

const DEFAULT_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:5})} {t} {m}";

#[derive(Debug, Deserialize)]
pub struct KeyValueEncoderConfig {
    pub pattern: Option<String>,
    #[serde(default = "default_highlight")]
    pub highlight_keys: bool,
}

fn default_highlight() -> bool {
    true
}

/// Pattern encoder that appends the record's key-values as ` key=value` pairs.
///
/// Values containing whitespace or quotes are rendered as quoted strings so a line
/// stays splittable on spaces.
#[derive(Debug)]
pub struct KeyValueEncoder {
    pattern: PatternEncoder,
    highlight_keys: bool,
}

impl KeyValueEncoder {
    pub fn new(pattern: &str, highlight_keys: bool) -> Self {
        Self {
            pattern: PatternEncoder::new(pattern),
            highlight_keys,
        }
    }
}

impl Encode for KeyValueEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> anyhow::Result<()> {
        self.pattern.encode(w, record)?;

        let mut pairs = PairWriter {
            writer: w,
            highlight_keys: self.highlight_keys,
            failure: None,
        };
        if let Err(e) = record.key_values().visit(&mut pairs) {
            match pairs.failure.take() {
                Some(io_err) => return Err(io_err.into()),
                None => write!(w, " kv_error=\"{}\"", e)?,
            }
        }

        w.write_all(b"\n")?;
        Ok(())
    }
}

struct PairWriter<'a> {
    writer: &'a mut dyn Write,
    highlight_keys: bool,
    failure: Option<io::Error>,
}

impl PairWriter<'_> {
    fn write_pair(&mut self, key: &Key<'_>, value: &Value<'_>) -> io::Result<()> {
        if self.highlight_keys {
            self.writer.set_style(Style::new().text(Color::Cyan))?;
        }
        write!(self.writer, " {}=", key)?;
        if self.highlight_keys {
            self.writer.set_style(&Style::default())?;
        }

        let rendered = value.to_string();
        if rendered.is_empty() || rendered.contains(|c: char| c.is_whitespace() || c == '"') {
            write!(self.writer, "{:?}", rendered)
        } else {
            self.writer.write_all(rendered.as_bytes())
        }
    }
}

impl<'kvs> VisitSource<'kvs> for PairWriter<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.write_pair(&key, &value).map_err(|e| {
            self.failure = Some(e);
            kv::Error::msg("failed to write key-value pair")
        })
    }
}

pub struct KeyValueEncoderDeserializer;

impl log4rs::config::Deserialize for KeyValueEncoderDeserializer {
    type Trait = dyn Encode;
    type Config = KeyValueEncoderConfig;

    fn deserialize(
        &self,
        config: KeyValueEncoderConfig,
        _: &log4rs::config::Deserializers,
    ) -> anyhow::Result<Box<dyn Encode>> {
        let pattern = config.pattern.as_deref().unwrap_or(DEFAULT_PATTERN);
        Ok(Box::new(KeyValueEncoder::new(pattern, config.highlight_keys)))
    }
}
