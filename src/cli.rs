use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "bitcoind-relay")]
#[command(about = "Validating JSON-RPC relay for a trusted bitcoind", long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        help = "Path to the configuration file",
        default_value = "data/relay.toml"
    )]
    pub config: PathBuf,
    #[command(flatten)]
    pub backend: BackendArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BackendArgs {
    #[arg(short = 'u', long, global = true, help = "Override the backend JSON-RPC URL")]
    pub backend_url: Option<String>,
    #[arg(long, global = true, help = "Override the chain the backend must report")]
    pub chain: Option<String>,
    #[arg(long, global = true, help = "Override the number of attempts per call")]
    pub total_tries: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the backend, run the chain and version checks, and print its status
    Check,
    /// Relay a single whitelisted call through the validating queue
    Call {
        #[arg(help = "RPC method, e.g. getblockhash")]
        method: String,
        #[arg(help = "Arguments as JSON values; anything that is not valid JSON is sent as a string")]
        args: Vec<String>,
    },
    /// List the methods the relay will forward
    Methods,
}

/// Parses a command line argument as JSON, falling back to a plain string.
///
/// Lets `call getblock 0000...` work without shell-quoting the hash.
pub fn parse_call_argument(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
