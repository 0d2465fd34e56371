#![allow(dead_code)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Log;
use alloy::sol_types::{SolEvent, SolValue};
use alloy::transports::mock::Asserter;
use csm_dashboard_scripts::beacon_api::BeaconApiClient;
use csm_dashboard_scripts::consts;
use csm_dashboard_scripts::eth_client::{
    CSAccountingContractWrapper, CSFeeDistributorContractWrapper, CSModule, CSModuleContractWrapper, CacheSettings,
    DefaultProvider, StETHContractWrapper,
};
use csm_dashboard_scripts::ipfs_logs::IpfsLogClient;
use csm_dashboard_scripts::lido_api::LidoApiClient;
use csm_dashboard_scripts::operator_service::{LookupSettings, OperatorService};
use csm_dashboard_scripts::prometheus_metrics::Metrics;
use csm_dashboard_scripts::rewards_tree::FileRewardsTreeReader;
use csm_dashboard_scripts::tracing as tracing_config;
use tempfile::TempDir;

pub const ETH: u128 = 1_000_000_000_000_000_000;
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    tracing_config::setup_logger(tracing_config::LoggingConfig::default_for_test());
}

pub fn metrics() -> Metrics {
    Metrics::new("test")
}

pub fn mocked_provider(asserter: &Asserter) -> Arc<DefaultProvider> {
    Arc::new(
        ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_mocked_client(asserter.clone())
            .erased(),
    )
}

pub fn push_return(asserter: &Asserter, encoded: Vec<u8>) {
    asserter.push_success(&Bytes::from(encoded));
}

pub fn push_u256(asserter: &Asserter, value: u128) {
    push_return(asserter, U256::from(value).abi_encode());
}

pub fn push_operator(asserter: &Asserter, manager: Address, reward: Address, deposited: u32, exited: u32) {
    let operator = CSModule::NodeOperator {
        totalAddedKeys: deposited,
        totalWithdrawnKeys: 0,
        totalDepositedKeys: deposited,
        totalVettedKeys: deposited,
        stuckValidatorsCount: 0,
        depositableValidatorsCount: 0,
        targetLimit: 0,
        targetLimitMode: 0,
        totalExitedKeys: exited,
        enqueuedCount: 0,
        managerAddress: manager,
        proposedManagerAddress: Address::ZERO,
        rewardAddress: reward,
        proposedRewardAddress: Address::ZERO,
        extendedManagerPermissions: false,
    };
    push_return(asserter, operator.abi_encode());
}

pub fn push_signing_keys(asserter: &Asserter, keys: &[[u8; 48]]) {
    push_return(asserter, Bytes::from(keys.concat()).abi_encode());
}

pub fn push_block_number(asserter: &Asserter, block: u64) {
    asserter.push_success(&U64::from(block));
}

/// An `eth_getLogs` answer carrying `events`, all mined in `block`.
pub fn push_events<E: SolEvent>(asserter: &Asserter, events: &[E], block: u64) {
    let logs: Vec<Log> = events
        .iter()
        .map(|event| Log {
            inner: alloy::primitives::Log {
                address: Address::ZERO,
                data: event.encode_log_data(),
            },
            block_number: Some(block),
            block_timestamp: Some(1_700_000_000),
            transaction_hash: Some(B256::with_last_byte(0x42)),
            ..Default::default()
        })
        .collect();
    asserter.push_success(&logs);
}

pub fn push_bond(asserter: &Asserter, current: u128, required: u128) {
    push_return(asserter, (U256::from(current), U256::from(required)).abi_encode_params());
}

/// A `proofs.json` snapshot on disk; the directory lives as long as the returned guard.
pub fn write_tree(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("proofs.json");
    std::fs::write(&path, content).expect("write tree");
    (dir, path)
}

/// Service wired to a mocked RPC, a file-based tree and `http_base` for every HTTP source.
pub fn operator_service(
    asserter: &Asserter,
    tree_path: &std::path::Path,
    http_base: &str,
) -> OperatorService<FileRewardsTreeReader> {
    let metrics = metrics();
    let provider = mocked_provider(asserter);
    let cache_settings = CacheSettings::default();
    let contracts = consts::contracts::MAINNET;

    OperatorService {
        csmodule: CSModuleContractWrapper::new(
            Arc::clone(&provider),
            contracts.csmodule,
            Arc::clone(&metrics.services.eth_client),
            cache_settings,
        ),
        accounting: CSAccountingContractWrapper::new(
            Arc::clone(&provider),
            contracts.csaccounting,
            Arc::clone(&metrics.services.eth_client),
            cache_settings,
        ),
        fee_distributor: CSFeeDistributorContractWrapper::new(
            Arc::clone(&provider),
            contracts.csfeedistributor,
            Arc::clone(&metrics.services.eth_client),
            cache_settings,
        ),
        steth: StETHContractWrapper::new(
            Arc::clone(&provider),
            contracts.steth,
            Arc::clone(&metrics.services.eth_client),
            cache_settings,
        ),
        rewards_tree: FileRewardsTreeReader::new(tree_path),
        beacon_api: BeaconApiClient::new(http_base, None, TIMEOUT, Arc::clone(&metrics.services.beacon_api))
            .expect("beacon client"),
        lido_api: LidoApiClient::new(http_base, TIMEOUT, Arc::clone(&metrics.services.lido_api)).expect("lido client"),
        ipfs_logs: IpfsLogClient::new(http_base, TIMEOUT, 16, Arc::clone(&metrics.services.ipfs))
            .expect("ipfs client"),
        settings: LookupSettings {
            lookup_concurrency: 1,
            distribution_log_from_block: 0,
            distribution_log_block_range: 1000,
        },
    }
}
