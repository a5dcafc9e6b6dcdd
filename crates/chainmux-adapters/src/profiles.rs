//! Known endpoint sets for development and quick diagnostics.
//!
//! Production deployments configure their own [`AdapterConfig`] lists;
//! these profiles mirror the community servers each family is most
//! often pointed at.

use chainmux_core::Endpoint;

use crate::{AdapterConfig, Family};

/// Free, keyless Ethereum mainnet JSON-RPC servers. Rate limits are
/// low and reliability varies, which is what the parallel race is for.
pub fn ethereum_public_rpc() -> AdapterConfig {
    AdapterConfig::new(
        Family::Rpc,
        vec![
            Endpoint::new("https://ethereum-rpc.publicnode.com"),
            Endpoint::new("https://cloudflare-eth.com"),
            Endpoint::new("https://rpc.ankr.com/eth"),
            Endpoint::new("https://eth.llamarpc.com"),
        ],
    )
}

/// Infura mainnet endpoint. The key rides the URL path, so the stored
/// URL keeps the `{api_key}` placeholder and diagnostics stay clean.
pub fn infura_rpc(project_id: &str) -> Endpoint {
    Endpoint::with_api_key("https://mainnet.infura.io/v3/{api_key}", project_id)
}

/// Alchemy mainnet endpoint, path-keyed like Infura.
pub fn alchemy_rpc(api_key: &str) -> Endpoint {
    Endpoint::with_api_key("https://eth-mainnet.g.alchemy.com/v2/{api_key}", api_key)
}

/// Etherscan explorer base. Keyless requests are throttled to one
/// every five seconds; pass a key for anything beyond smoke tests.
pub fn etherscan(api_key: Option<&str>) -> AdapterConfig {
    let endpoint = match api_key {
        Some(key) => Endpoint::with_api_key("https://api.etherscan.io", key),
        None => Endpoint::new("https://api.etherscan.io"),
    };
    AdapterConfig::new(Family::Evmscan, vec![endpoint])
}

/// Trezor's public Ethereum blockbook pair.
pub fn ethereum_blockbooks() -> AdapterConfig {
    AdapterConfig::new(
        Family::Blockbook,
        vec![
            Endpoint::new("https://eth1.trezor.io"),
            Endpoint::new("https://eth2.trezor.io"),
        ],
    )
}

/// Full Ethereum mainnet stack in router priority order: nodes first,
/// explorer second, indexer last.
pub fn ethereum_mainnet(etherscan_key: Option<&str>) -> Vec<AdapterConfig> {
    vec![
        ethereum_public_rpc(),
        etherscan(etherscan_key),
        ethereum_blockbooks(),
    ]
}

/// Polygon mainnet: public nodes plus the polygonscan explorer. No
/// public blockbook tracks this chain.
pub fn polygon_mainnet(polygonscan_key: Option<&str>) -> Vec<AdapterConfig> {
    let rpc = AdapterConfig::new(
        Family::Rpc,
        vec![
            Endpoint::new("https://polygon-rpc.com"),
            Endpoint::new("https://rpc.ankr.com/polygon"),
            Endpoint::new("https://polygon.llamarpc.com"),
        ],
    );
    let scan = match polygonscan_key {
        Some(key) => Endpoint::with_api_key("https://api.polygonscan.com", key),
        None => Endpoint::new("https://api.polygonscan.com"),
    };
    vec![rpc, AdapterConfig::new(Family::Evmscan, vec![scan])]
}
