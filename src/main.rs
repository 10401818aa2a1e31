use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use erc20_transfer_analytics::config::AppConfig;
use erc20_transfer_analytics::logging::{init_logging, LogContext};
use erc20_transfer_analytics::{Pipeline, RpcClient};

#[derive(Parser)]
#[command(name = "analyzer")]
#[command(about = "Fetch a block range and its ERC-20 transfers, then print analytics as JSON")]
#[command(version = "0.1.0")]
struct Args {
    /// Configuration file (defaults to $CONFIG_FILE or config.toml)
    #[arg(long)]
    config: Option<String>,

    /// JSON-RPC endpoint, overrides the configuration
    #[arg(long)]
    rpc_url: Option<String>,

    /// First block of the range
    #[arg(long)]
    from_block: Option<u64>,

    /// Last block of the range (defaults to the latest block)
    #[arg(long)]
    to_block: Option<u64>,

    /// Token contract to analyze
    #[arg(long)]
    token: Option<String>,

    /// Pretty-print the report
    #[arg(long)]
    pretty: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    sample_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.sample_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    let config = load_config(&args)?;
    init_logging(&config.logging)?;

    let client = RpcClient::from_config(&config.rpc)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let signal = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            LogContext::new("main", "shutdown").warn("Interrupt received, cancelling run");
            signal.store(true, Ordering::SeqCst);
        }
    });

    let report = Pipeline::new(&config, &client).run(&cancel).await?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);

    Ok(())
}

/// File, then environment, then command line; validated once at the end
fn load_config(args: &Args) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var("CONFIG_FILE").ok())
        .unwrap_or_else(|| "config.toml".to_string());

    let mut config = AppConfig::load_from_file(&path)?;
    config.apply_env_overrides()?;

    if let Some(url) = &args.rpc_url {
        config.rpc.endpoint = url.clone();
    }
    if let Some(from_block) = args.from_block {
        config.range.start_block = Some(from_block);
    }
    if let Some(to_block) = args.to_block {
        config.range.end_block = Some(to_block);
    }
    if let Some(token) = &args.token {
        config.token.contract_address = token.clone();
    }

    config.validate()?;
    Ok(config)
}
