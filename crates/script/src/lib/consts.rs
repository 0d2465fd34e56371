use std::time::Duration;

use alloy::primitives::{address, Address};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsmContracts {
    pub csmodule: Address,
    pub csaccounting: Address,
    pub csfeedistributor: Address,
    pub steth: Address,
}

pub mod contracts {
    use super::*;

    // https://docs.lido.fi/deployed-contracts/#community-staking-module
    pub const MAINNET: CsmContracts = CsmContracts {
        csmodule: address!("dA7dE2ECdDfccC6c3AF10108Db212ACBBf9EA83F"),
        csaccounting: address!("4d72BFF1BeaC69925F8Bd12526a39BAAb069e5Da"),
        csfeedistributor: address!("D99CC66fEC647E68294C6477B40fC7E0F6F618D0"),
        steth: address!("ae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
    };

    /// No distribution log can predate this block on mainnet.
    pub const MAINNET_DISTRIBUTION_LOG_FROM_BLOCK: u64 = 20_800_000;
}

pub mod defaults {
    pub const ETH_RPC_URL: &str = "https://eth.llamarpc.com";
    pub const BEACON_API_URL: &str = "https://beaconcha.in/api/v1";
    pub const REWARDS_PROOFS_URL: &str =
        "https://raw.githubusercontent.com/lidofinance/csm-rewards/mainnet/proofs.json";
    pub const LIDO_API_URL: &str = "https://eth-api.lido.fi";
    pub const IPFS_GATEWAY_URL: &str = "https://ipfs.io";

    pub const CACHE_TTL_SECONDS: u64 = 300;
    pub const REWARDS_TREE_TTL_SECONDS: u64 = 3600;
    pub const CACHE_MAX_ENTRIES: usize = 1000;
    pub const OPERATOR_LOOKUP_CONCURRENCY: usize = 16;
    pub const DISTRIBUTION_LOG_BLOCK_RANGE: u64 = 500_000;
    pub const PROMETHEUS_NAMESPACE: &str = "csm_dashboard";
    pub const SERVICE_BIND_TO_ADDR: &str = "0.0.0.0:8080";
    pub const WATCH_INTERVAL_SECONDS: u64 = 300;
    pub const CACHE_CLEANUP_INTERVAL_SECONDS: u64 = 60;

    pub const HTTP_TIMEOUT_SECONDS: u64 = 30;
}

/// Values that move every block (balances, counters) are cached shortly.
pub const VOLATILE_READ_TTL: Duration = Duration::from_secs(60);

/// IPFS content is immutable, so logs are kept for as long as the cache has room.
pub const IPFS_LOG_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

pub mod batching {
    pub const SIGNING_KEYS_PER_CALL: u64 = 100;
    pub const BEACON_API_PUBKEYS_PER_REQUEST: usize = 100;
    pub const IPFS_CONCURRENT_FETCHES: usize = 4;
}
