use anyhow::{Context, bail};
use bitcoind_relay::{
    BackendConnection, Outcome,
    cli::{Cli, Commands, parse_call_argument},
    config::{ApplyArgs, load_configuration},
    log::init_logging,
    validator::METHODS,
};
use clap::Parser;
use log::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging();

    if let Commands::Methods = cli.command {
        for spec in METHODS {
            println!("{} ({}..={} arguments)", spec.name, spec.min_args, spec.max_args);
        }
        return Ok(());
    }

    let mut config = load_configuration(&cli.config)?;
    config.apply_backend(&cli.backend);
    let backend_config = config.backend_config()?;

    let connection = BackendConnection::open(backend_config)
        .await
        .context("Could not open backend connection")?;

    let result = match cli.command {
        Commands::Check => {
            let status = connection.status();
            println!("chain:   {}", status.chain);
            println!("version: {}", status.version);
            println!("blocks:  {}", status.blocks);
            Ok(())
        },
        Commands::Call { method, args } => {
            let arguments = args.iter().map(|a| parse_call_argument(a)).collect();
            info!(method = &*method; "Relaying call");
            relay_call(&connection, &method, arguments).await
        },
        Commands::Methods => Ok(()),
    };

    connection.close().await;
    result
}

async fn relay_call(
    connection: &BackendConnection,
    method: &str,
    arguments: Vec<serde_json::Value>,
) -> Result<(), anyhow::Error> {
    match connection.client().invoke(method, arguments).await? {
        Outcome::Result(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        },
        Outcome::BusinessError(error) => bail!("Backend returned an error: {}", error),
        Outcome::TransportError(e) => {
            if e.is_access_denied() {
                bail!("Backend rejected the configured credentials");
            }
            Err(e).context("Backend unreachable after all attempts")
        },
    }
}
