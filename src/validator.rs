//! Whitelist of relayable methods and the shape checks for their arguments.
//!
//! The backend trusts anything it receives, so nothing reaches the transport unless
//! its method appears in [`METHODS`] and every argument passes the check declared
//! for its position. Adding a method is a table edit.
//!
//! Validation is pure: it never touches the network and returns the params exactly
//! as they will be sent, with optional arguments filled in.

use serde_json::Value;
use thiserror::Error;

/// Shape a single positional argument must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Non-negative JSON integer.
    UnsignedInteger,
    /// JSON string of hex digits; `bytes` pins the decoded length when set.
    Hex { bytes: Option<usize> },
    /// JSON integer that must be 0 or 1.
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub kind: ArgKind,
    /// Value sent on the wire when an optional argument is omitted.
    pub default: Option<u64>,
}

impl ArgSpec {
    const fn required(kind: ArgKind) -> Self {
        Self { kind, default: None }
    }

    const fn optional(kind: ArgKind, default: u64) -> Self {
        Self {
            kind,
            default: Some(default),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub args: &'static [ArgSpec],
}

const HASH: ArgSpec = ArgSpec::required(ArgKind::Hex { bytes: Some(32) });
const HEX_DATA: ArgSpec = ArgSpec::required(ArgKind::Hex { bytes: None });
const HEIGHT: ArgSpec = ArgSpec::required(ArgKind::UnsignedInteger);
const VERBOSE: ArgSpec = ArgSpec::optional(ArgKind::Flag, 0);

pub static METHODS: &[MethodSpec] = &[
    MethodSpec {
        name: "getinfo",
        min_args: 0,
        max_args: 0,
        args: &[],
    },
    MethodSpec {
        name: "getblockchaininfo",
        min_args: 0,
        max_args: 0,
        args: &[],
    },
    MethodSpec {
        name: "getblockcount",
        min_args: 0,
        max_args: 0,
        args: &[],
    },
    MethodSpec {
        name: "getblockhash",
        min_args: 1,
        max_args: 1,
        args: &[HEIGHT],
    },
    MethodSpec {
        name: "getblock",
        min_args: 1,
        max_args: 1,
        args: &[HASH],
    },
    MethodSpec {
        name: "getrawtransaction",
        min_args: 1,
        max_args: 2,
        args: &[HASH, VERBOSE],
    },
    MethodSpec {
        name: "decoderawtransaction",
        min_args: 1,
        max_args: 1,
        args: &[HEX_DATA],
    },
    MethodSpec {
        name: "sendrawtransaction",
        min_args: 1,
        max_args: 1,
        args: &[HEX_DATA],
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    #[error("too few arguments: {method} takes at least {min}, got {got}")]
    TooFewArguments { method: &'static str, min: usize, got: usize },

    #[error("too many arguments: {method} takes at most {max}, got {got}")]
    TooManyArguments { method: &'static str, max: usize, got: usize },

    #[error("invalid argument type at position {position}")]
    InvalidArgumentType { position: usize },

    #[error("hex length incorrect at position {position}: expected {expected} bytes, got {got}")]
    HexLengthIncorrect { position: usize, expected: usize, got: usize },

    #[error("invalid bool at position {position}: 0/1 expected")]
    InvalidBool { position: usize },
}

pub fn lookup(method: &str) -> Option<&'static MethodSpec> {
    METHODS.iter().find(|spec| spec.name == method)
}

/// Checks a call against the whitelist and returns the params to put on the wire.
pub fn validate(method: &str, arguments: &[Value]) -> Result<Vec<Value>, ValidationError> {
    let spec = lookup(method).ok_or_else(|| ValidationError::InvalidMethod(method.to_string()))?;

    let count = arguments.len();
    if count < spec.min_args {
        return Err(ValidationError::TooFewArguments {
            method: spec.name,
            min: spec.min_args,
            got: count,
        });
    }
    if count > spec.max_args {
        return Err(ValidationError::TooManyArguments {
            method: spec.name,
            max: spec.max_args,
            got: count,
        });
    }

    let mut params = Vec::with_capacity(spec.args.len());
    for (position, arg) in spec.args.iter().enumerate() {
        match arguments.get(position) {
            Some(value) => params.push(check_argument(position, arg.kind, value)?),
            None => {
                if let Some(default) = arg.default {
                    params.push(Value::from(default));
                }
            },
        }
    }

    Ok(params)
}

fn check_argument(position: usize, kind: ArgKind, value: &Value) -> Result<Value, ValidationError> {
    match kind {
        ArgKind::UnsignedInteger => get_number(position, value).map(Value::from),
        ArgKind::Flag => match get_number(position, value)? {
            flag @ (0 | 1) => Ok(Value::from(flag)),
            _ => Err(ValidationError::InvalidBool { position }),
        },
        ArgKind::Hex { bytes } => get_hex(position, value, bytes).map(Value::from),
    }
}

fn get_number(position: usize, value: &Value) -> Result<u64, ValidationError> {
    value
        .as_u64()
        .ok_or(ValidationError::InvalidArgumentType { position })
}

fn get_hex(position: usize, value: &Value, bytes: Option<usize>) -> Result<String, ValidationError> {
    let data = value
        .as_str()
        .ok_or(ValidationError::InvalidArgumentType { position })?;
    let decoded = hex::decode(data).map_err(|_| ValidationError::InvalidArgumentType { position })?;

    if let Some(expected) = bytes {
        if decoded.len() != expected {
            return Err(ValidationError::HexLengthIncorrect {
                position,
                expected,
                got: decoded.len(),
            });
        }
    }

    Ok(data.to_string())
}
