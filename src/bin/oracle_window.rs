//! Oracle Window Inspector
//!
//! Queries a price relay and prints, as JSON, either the bracketing pair that
//! would settle a contract maturing at `--maturity`, or the latest verified
//! observation (`--latest`).
//!
//! Usage:
//!   oracle_window --signer-key 02d0... --relay-host oracles.example.com --maturity 1700000000
//!   oracle_window --config oracle.toml --latest
//!
//! Environment Variables:
//!   ORACLE_SIGNER_KEY, ORACLE_RELAY_HOST, ORACLE_RELAY_PORT, ORACLE_REQUEST_TIMEOUT_MS,
//!   ORACLE_WINDOW_PADDING_SECS, ORACLE_WINDOW_SIZE, ORACLE_REQUIRE_CONSECUTIVE_SEQUENCE
//!   ORACLE_CONFIG_PATH - TOML config file, same as --config
//!   RUST_LOG - log filter (default: info,oracle_settlement=debug)

use anyhow::{bail, Context};
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oracle_settlement::oracle::{OracleClient, OracleConfig, RelayHttpTransport};
use oracle_settlement::settlement::SettlementPipeline;

#[derive(Parser, Debug)]
#[command(name = "oracle_window")]
#[command(about = "Resolve the oracle settlement window for a maturity timestamp")]
struct Args {
    /// Path to TOML configuration file (otherwise ORACLE_* environment)
    #[arg(short, long, env = "ORACLE_CONFIG_PATH")]
    config: Option<String>,

    /// Compressed signer public key (hex)
    #[arg(long)]
    signer_key: Option<String>,

    /// Relay hostname
    #[arg(long)]
    relay_host: Option<String>,

    /// Relay port
    #[arg(long)]
    relay_port: Option<u16>,

    /// Contract maturity (unix seconds)
    #[arg(short, long, conflicts_with = "latest")]
    maturity: Option<i64>,

    /// Print the latest verified observation instead
    #[arg(long)]
    latest: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,oracle_settlement=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn load_config(args: &Args) -> anyhow::Result<OracleConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path);
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path))?;
            OracleConfig::from_toml_str(&content)?
        }
        None => OracleConfig::from_env(),
    };

    if let Some(key) = &args.signer_key {
        config.signer_key = key.clone();
    }
    if let Some(host) = &args.relay_host {
        config.relay_host = host.clone();
    }
    if let Some(port) = args.relay_port {
        config.relay_port = port;
    }

    let violations = config.validate();
    if !violations.is_empty() {
        for v in &violations {
            error!("Config violation: {}", v);
        }
        bail!("invalid oracle configuration ({} violations)", violations.len());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = load_config(&args).await?;
    let signer_key = config.signer_key_bytes()?;
    let transport = RelayHttpTransport::from_config(&config)?;
    info!(relay = transport.url(), signer = %config.signer_key, "Oracle relay configured");

    let output = if args.latest {
        let client = OracleClient::new(transport);
        let observation = client.latest_observation(&signer_key).await?;
        serde_json::to_string_pretty(&observation)?
    } else {
        let Some(maturity) = args.maturity else {
            bail!("either --maturity or --latest is required");
        };
        let pipeline = SettlementPipeline::new(transport, &config);
        let pair = pipeline.resolve_window(&signer_key, maturity).await?;
        serde_json::to_string_pretty(&pair)?
    };

    println!("{}", output);
    Ok(())
}
