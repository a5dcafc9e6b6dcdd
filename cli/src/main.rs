//! chainmux CLI — query chains through the multi-provider router.
//!
//! Usage:
//! ```bash
//! # Current block height over the default Ethereum mainnet profile
//! chainmux height
//!
//! # Account nonce, preferring your own node
//! chainmux nonce --address 0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045 \
//!     --rpc http://localhost:8545
//!
//! # Raw JSON-RPC call, raced across the rpc family
//! chainmux call --method eth_gasPrice
//!
//! # Capability table per family
//! chainmux families
//! ```

use std::env;
use std::process;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use chainmux_adapters::{profiles, router_from_configs, AdapterConfig, Family};
use chainmux_core::{Endpoint, Operation, Router};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "height" => cmd_height(&args[2..]).await,
        "nonce" => cmd_nonce(&args[2..]).await,
        "call" => cmd_call(&args[2..]).await,
        "families" => {
            cmd_families();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chainmux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainmux {}", env!("CARGO_PKG_VERSION"));
    println!("Query blockchains through a multi-provider router\n");
    println!("USAGE:");
    println!("    chainmux <COMMAND>\n");
    println!("COMMANDS:");
    println!("    height     Fetch the current block height");
    println!("    nonce      Fetch an account nonce");
    println!("    call       Send a raw JSON-RPC call through the rpc family");
    println!("    families   Show each family's supported operations");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("ENDPOINT FLAGS (default: public Ethereum mainnet profile):");
    println!("    --rpc <URL>            Add a JSON-RPC node  [repeatable]");
    println!("    --evmscan <URL>        Add an explorer API base  [repeatable]");
    println!("    --blockbook <URL>      Add a blockbook instance  [repeatable]");
    println!("    --etherscan-key <KEY>  Explorer API key\n");
    println!("NONCE FLAGS:");
    println!("    --address <ADDR>  Account address  [required]");
    println!("CALL FLAGS:");
    println!("    --method <METHOD>  JSON-RPC method  [required]");
    println!("    --params <JSON>    Params value  [default: []]");
}

async fn cmd_height(args: &[String]) -> anyhow::Result<()> {
    let router = router_from_flags(args);

    let start = Instant::now();
    let height = router.fetch_block_height().await?;
    let latency = start.elapsed();

    println!("  Height:  {height}");
    println!("  Latency: {}ms", latency.as_millis());
    Ok(())
}

async fn cmd_nonce(args: &[String]) -> anyhow::Result<()> {
    let address = parse_flag(args, "--address")
        .ok_or_else(|| anyhow::anyhow!("--address is required"))?;
    let router = router_from_flags(args);

    let nonce = router.fetch_nonce(&address).await?;
    println!("  Address: {address}");
    println!("  Nonce:   {nonce}");
    Ok(())
}

async fn cmd_call(args: &[String]) -> anyhow::Result<()> {
    let method =
        parse_flag(args, "--method").ok_or_else(|| anyhow::anyhow!("--method is required"))?;
    let params = match parse_flag(args, "--params") {
        Some(text) => serde_json::from_str(&text)?,
        None => serde_json::json!([]),
    };
    let router = router_from_flags(args);

    let reply = router.multicast_raw(&method, &params).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&reply.result).unwrap_or_default()
    );
    Ok(())
}

fn cmd_families() {
    let configs = profiles::ethereum_mainnet(None);
    let router = router_from_configs(&configs);

    println!("Backend families (default Ethereum mainnet profile):\n");
    for (adapter, config) in router.adapters().iter().zip(&configs) {
        println!("  {} ({} endpoints)", adapter.name(), config.endpoints.len());
        for op in Operation::ALL {
            let strategy = adapter.strategy_for(op);
            if strategy.is_supported() {
                println!("    {:<22} {:?}", op.as_str(), strategy);
            }
        }
        println!();
    }
}

/// Builds the router from endpoint flags, or the public Ethereum
/// mainnet profile when none are given.
fn router_from_flags(args: &[String]) -> Router {
    let rpc = parse_multi(args, "--rpc");
    let evmscan = parse_multi(args, "--evmscan");
    let blockbook = parse_multi(args, "--blockbook");
    let key = parse_flag(args, "--etherscan-key");

    if rpc.is_empty() && evmscan.is_empty() && blockbook.is_empty() {
        return router_from_configs(&profiles::ethereum_mainnet(key.as_deref()));
    }

    let mut configs = Vec::new();
    if !rpc.is_empty() {
        let endpoints = rpc.into_iter().map(Endpoint::new).collect();
        configs.push(AdapterConfig::new(Family::Rpc, endpoints));
    }
    if !evmscan.is_empty() {
        let endpoints = evmscan
            .into_iter()
            .map(|url| match &key {
                Some(key) => Endpoint::with_api_key(url, key),
                None => Endpoint::new(url),
            })
            .collect();
        configs.push(AdapterConfig::new(Family::Evmscan, endpoints));
    }
    if !blockbook.is_empty() {
        let endpoints = blockbook.into_iter().map(Endpoint::new).collect();
        configs.push(AdapterConfig::new(Family::Blockbook, endpoints));
    }
    tracing::debug!("router over {} families", configs.len());
    router_from_configs(&configs)
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_multi(args: &[String], flag: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            if let Some(value) = iter.next() {
                values.push(value.clone());
            }
        }
    }
    values
}
