use std::sync::Arc;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportErrorKind};
use csm_dashboard_shared::csm::{BlsPubkey, BondSummary, NodeOperator, NodeOperatorId, BLS_PUBKEY_LENGTH};
use csm_dashboard_shared::util::{uint256_to_u128, uint256_to_u64, ConversionError};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::Instrument;
use CSAccounting::CSAccountingInstance;
use CSFeeDistributor::CSFeeDistributorInstance;
use CSModule::CSModuleInstance;
use StETH::StETHInstance;

use crate::cache::TtlCache;
use crate::consts;
use crate::prometheus_metrics::{self, services::eth_client as ops};

sol! {
    #[sol(rpc)]
    interface CSModule {
        #[derive(Debug)]
        struct NodeOperator {
            uint32 totalAddedKeys;
            uint32 totalWithdrawnKeys;
            uint32 totalDepositedKeys;
            uint32 totalVettedKeys;
            uint32 stuckValidatorsCount;
            uint32 depositableValidatorsCount;
            uint32 targetLimit;
            uint8 targetLimitMode;
            uint32 totalExitedKeys;
            uint32 enqueuedCount;
            address managerAddress;
            address proposedManagerAddress;
            address rewardAddress;
            address proposedRewardAddress;
            bool extendedManagerPermissions;
        }

        function getNodeOperatorsCount() external view returns (uint256);
        function getNodeOperator(uint256 nodeOperatorId) external view returns (NodeOperator memory);
        function getSigningKeys(uint256 nodeOperatorId, uint256 startIndex, uint256 keysCount)
            external view returns (bytes memory);
    }
}

sol! {
    #[sol(rpc)]
    interface CSAccounting {
        function getBondSummary(uint256 nodeOperatorId) external view returns (uint256 current, uint256 required);
    }
}

sol! {
    #[sol(rpc)]
    interface CSFeeDistributor {
        #[derive(Debug)]
        event DistributionLogUpdated(string logCid);

        function distributedShares(uint256 nodeOperatorId) external view returns (uint256);
        function treeRoot() external view returns (bytes32);
    }
}

sol! {
    #[sol(rpc)]
    interface StETH {
        #[derive(Debug)]
        event TransferShares(address indexed from, address indexed to, uint256 sharesValue);

        function getPooledEthByShares(uint256 sharesAmount) external view returns (uint256);
    }
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Call reverted: {0}")]
    Reverted(String),

    #[error("Other alloy error {0:#?}")]
    OtherAlloyError(alloy::contract::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError<TransportErrorKind>),

    #[error("{0}")]
    Conversion(#[from] ConversionError),

    #[error("Malformed signing keys: {0} bytes is not a whole number of keys")]
    MalformedSigningKeys(usize),

    #[error("Operator lookup incomplete: {failed} of {total} operator records could not be read")]
    LookupIncomplete { failed: u64, total: u64 },
}

impl From<alloy::contract::Error> for ContractError {
    fn from(error: alloy::contract::Error) -> Self {
        if let alloy::contract::Error::TransportError(RpcError::ErrorResp(ref error_payload)) = error {
            if error_payload.message.contains("execution reverted") {
                return ContractError::Reverted(error_payload.message.to_string());
            }
        }
        ContractError::OtherAlloyError(error)
    }
}

/// TTLs and size bound shared by the contract read caches.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub records_ttl: Duration,
    pub volatile_ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            records_ttl: Duration::from_secs(consts::defaults::CACHE_TTL_SECONDS),
            volatile_ttl: consts::VOLATILE_READ_TTL,
            max_entries: consts::defaults::CACHE_MAX_ENTRIES,
        }
    }
}

/// Inclusive `[start, end]` ranges of at most `block_range` blocks covering
/// `from_block..=latest_block`.
pub fn block_chunks(from_block: u64, latest_block: u64, block_range: u64) -> impl Iterator<Item = (u64, u64)> {
    let block_range = block_range.max(1);
    let mut next = (from_block <= latest_block).then_some(from_block);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(block_range - 1).min(latest_block);
        next = end.checked_add(1).filter(|block| *block <= latest_block);
        Some((start, end))
    })
}

/// Staking token shares moved between two addresses by one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharesTransfer {
    pub block_number: u64,
    pub block_timestamp: Option<u64>,
    pub tx_hash: B256,
    pub shares: u128,
}

pub fn split_signing_keys(raw: &[u8]) -> Result<Vec<BlsPubkey>, ContractError> {
    let chunks = raw.chunks_exact(BLS_PUBKEY_LENGTH);
    if !chunks.remainder().is_empty() {
        return Err(ContractError::MalformedSigningKeys(raw.len()));
    }
    Ok(chunks
        .map(|chunk| {
            let mut key = [0u8; BLS_PUBKEY_LENGTH];
            key.copy_from_slice(chunk);
            key
        })
        .collect())
}

fn node_operator_from_sol(id: NodeOperatorId, raw: CSModule::NodeOperator) -> NodeOperator {
    NodeOperator {
        id,
        total_added_keys: raw.totalAddedKeys,
        total_withdrawn_keys: raw.totalWithdrawnKeys,
        total_deposited_keys: raw.totalDepositedKeys,
        total_vetted_keys: raw.totalVettedKeys,
        stuck_validators_count: raw.stuckValidatorsCount,
        depositable_validators_count: raw.depositableValidatorsCount,
        target_limit: raw.targetLimit,
        target_limit_mode: raw.targetLimitMode,
        total_exited_keys: raw.totalExitedKeys,
        enqueued_count: raw.enqueuedCount,
        manager_address: raw.managerAddress,
        proposed_manager_address: raw.proposedManagerAddress,
        reward_address: raw.rewardAddress,
        proposed_reward_address: raw.proposedRewardAddress,
        extended_manager_permissions: raw.extendedManagerPermissions,
    }
}

pub struct CSModuleContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    contract: CSModuleInstance<Arc<P>>,
    metric_reporter: Arc<prometheus_metrics::Service>,
    cache_settings: CacheSettings,
    operators_count: TtlCache<(), u64>,
    operators: TtlCache<NodeOperatorId, NodeOperator>,
}

impl<P> CSModuleContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(
        provider: Arc<P>,
        contract_address: Address,
        metric_reporter: Arc<prometheus_metrics::Service>,
        cache_settings: CacheSettings,
    ) -> Self {
        Self {
            contract: CSModuleInstance::new(contract_address, provider),
            metric_reporter,
            cache_settings,
            operators_count: TtlCache::new(cache_settings.volatile_ttl, 1),
            operators: TtlCache::new(cache_settings.records_ttl, cache_settings.max_entries),
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        self.operators_count.cleanup_expired() + self.operators.cleanup_expired()
    }

    async fn get_node_operators_count_impl(&self) -> Result<u64, ContractError> {
        let count = self
            .contract
            .getNodeOperatorsCount()
            .call()
            .await
            .inspect(|val| tracing::debug!("Obtained node operators count {val}"))
            .inspect_err(|err| tracing::error!("Failed to read node operators count {err:?}"))?;
        Ok(uint256_to_u64(count)?)
    }

    pub async fn get_node_operators_count(&self) -> Result<u64, ContractError> {
        self.operators_count
            .get_or_try_insert_with((), self.cache_settings.volatile_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_NODE_OPERATORS_COUNT, || {
                        self.get_node_operators_count_impl()
                    })
            })
            .await
    }

    async fn get_node_operator_impl(&self, id: NodeOperatorId) -> Result<NodeOperator, ContractError> {
        let raw = self
            .contract
            .getNodeOperator(id.into())
            .call()
            .await
            .inspect_err(|err| tracing::debug!(operator_id = id.0, "Failed to read node operator {id}: {err:?}"))?;
        Ok(node_operator_from_sol(id, raw))
    }

    pub async fn get_node_operator(&self, id: NodeOperatorId) -> Result<NodeOperator, ContractError> {
        self.operators
            .get_or_try_insert_with(id, self.cache_settings.records_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_NODE_OPERATOR, || self.get_node_operator_impl(id))
            })
            .await
    }

    async fn get_node_operator_with_retry(&self, id: NodeOperatorId) -> Result<NodeOperator, ContractError> {
        match self.get_node_operator(id).await {
            Ok(operator) => Ok(operator),
            Err(first_error) => {
                tracing::debug!(operator_id = id.0, "Retrying node operator {id} after {first_error:?}");
                self.get_node_operator(id).await
            }
        }
    }

    /// Scans operators in id order and returns the first one managed by, or paying rewards
    /// to, `address`. At most `concurrency` reads are in flight at a time.
    pub async fn find_operator_by_address(
        &self,
        address: Address,
        concurrency: usize,
    ) -> Result<Option<NodeOperator>, ContractError> {
        let total = self.get_node_operators_count().await?;
        tracing::info!(%address, total, "Searching {total} node operators for {address}");

        let mut failed: u64 = 0;
        let mut lookups = stream::iter(0..total)
            .map(|id| async move {
                let id = NodeOperatorId(id);
                (id, self.get_node_operator_with_retry(id).await)
            })
            .buffered(concurrency.max(1));

        while let Some((id, result)) = lookups.next().await {
            match result {
                Ok(operator) if operator.is_controlled_by(&address) => {
                    tracing::info!(%address, operator_id = id.0, "Found node operator {id} for {address}");
                    return Ok(Some(operator));
                }
                Ok(_) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!(operator_id = id.0, "Skipping node operator {id}: {e:?}");
                }
            }
        }

        if failed > 0 {
            Err(ContractError::LookupIncomplete { failed, total })
        } else {
            tracing::info!(%address, "No node operator found for {address}");
            Ok(None)
        }
    }

    async fn get_signing_keys_impl(
        &self,
        id: NodeOperatorId,
        start: u64,
        count: u64,
    ) -> Result<Vec<BlsPubkey>, ContractError> {
        let raw = self
            .contract
            .getSigningKeys(id.into(), U256::from(start), U256::from(count))
            .call()
            .await?;
        split_signing_keys(&raw)
    }

    /// Keys `[0, count)` of the operator, read in batches.
    pub async fn get_signing_keys(&self, id: NodeOperatorId, count: u64) -> Result<Vec<BlsPubkey>, ContractError> {
        let span = tracing::info_span!("get_signing_keys", operator_id = id.0, count);
        async {
            let mut keys = Vec::new();
            let mut start = 0;
            while start < count {
                let batch = consts::batching::SIGNING_KEYS_PER_CALL.min(count - start);
                let mut batch_keys = self
                    .metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_SIGNING_KEYS, || {
                        self.get_signing_keys_impl(id, start, batch)
                    })
                    .await?;
                keys.append(&mut batch_keys);
                start += batch;
            }
            Ok(keys)
        }
        .instrument(span)
        .await
    }
}

pub struct CSAccountingContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    contract: CSAccountingInstance<Arc<P>>,
    metric_reporter: Arc<prometheus_metrics::Service>,
    cache_settings: CacheSettings,
    bonds: TtlCache<NodeOperatorId, BondSummary>,
}

impl<P> CSAccountingContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(
        provider: Arc<P>,
        contract_address: Address,
        metric_reporter: Arc<prometheus_metrics::Service>,
        cache_settings: CacheSettings,
    ) -> Self {
        Self {
            contract: CSAccountingInstance::new(contract_address, provider),
            metric_reporter,
            cache_settings,
            bonds: TtlCache::new(cache_settings.volatile_ttl, cache_settings.max_entries),
        }
    }

    /// Bond and claimed rewards are held here, so claims are transfers out of this address.
    pub fn address(&self) -> &Address {
        self.contract.address()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.bonds.cleanup_expired()
    }

    async fn get_bond_summary_impl(&self, id: NodeOperatorId) -> Result<BondSummary, ContractError> {
        let result: CSAccounting::getBondSummaryReturn = self
            .contract
            .getBondSummary(id.into())
            .call()
            .await
            .inspect_err(|err| tracing::error!(operator_id = id.0, "Failed to read bond summary: {err:?}"))?;
        Ok(BondSummary::new(
            uint256_to_u128(result.current)?,
            uint256_to_u128(result.required)?,
        ))
    }

    pub async fn get_bond_summary(&self, id: NodeOperatorId) -> Result<BondSummary, ContractError> {
        self.bonds
            .get_or_try_insert_with(id, self.cache_settings.volatile_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_BOND_SUMMARY, || self.get_bond_summary_impl(id))
            })
            .await
    }
}

pub struct CSFeeDistributorContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    contract: CSFeeDistributorInstance<Arc<P>>,
    metric_reporter: Arc<prometheus_metrics::Service>,
    cache_settings: CacheSettings,
    distributed: TtlCache<NodeOperatorId, u128>,
    tree_root: TtlCache<(), B256>,
    log_cids: TtlCache<(), Vec<String>>,
}

impl<P> CSFeeDistributorContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(
        provider: Arc<P>,
        contract_address: Address,
        metric_reporter: Arc<prometheus_metrics::Service>,
        cache_settings: CacheSettings,
    ) -> Self {
        Self {
            contract: CSFeeDistributorInstance::new(contract_address, provider),
            metric_reporter,
            cache_settings,
            distributed: TtlCache::new(cache_settings.volatile_ttl, cache_settings.max_entries),
            tree_root: TtlCache::new(cache_settings.volatile_ttl, 1),
            log_cids: TtlCache::new(cache_settings.records_ttl, 1),
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        self.distributed.cleanup_expired() + self.tree_root.cleanup_expired() + self.log_cids.cleanup_expired()
    }

    async fn get_distributed_shares_impl(&self, id: NodeOperatorId) -> Result<u128, ContractError> {
        let shares = self
            .contract
            .distributedShares(id.into())
            .call()
            .await
            .inspect_err(|err| tracing::error!(operator_id = id.0, "Failed to read distributed shares: {err:?}"))?;
        Ok(uint256_to_u128(shares)?)
    }

    /// Shares the operator has already claimed.
    pub async fn get_distributed_shares(&self, id: NodeOperatorId) -> Result<u128, ContractError> {
        self.distributed
            .get_or_try_insert_with(id, self.cache_settings.volatile_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_DISTRIBUTED_SHARES, || {
                        self.get_distributed_shares_impl(id)
                    })
            })
            .await
    }

    async fn get_tree_root_impl(&self) -> Result<B256, ContractError> {
        Ok(self.contract.treeRoot().call().await?)
    }

    pub async fn get_tree_root(&self) -> Result<B256, ContractError> {
        self.tree_root
            .get_or_try_insert_with((), self.cache_settings.volatile_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_TREE_ROOT, || self.get_tree_root_impl())
            })
            .await
    }

    async fn get_distribution_log_cids_impl(
        &self,
        from_block: u64,
        block_range: u64,
    ) -> Result<Vec<String>, ContractError> {
        let latest_block = self.contract.provider().get_block_number().await?;
        tracing::info!(
            from_block,
            latest_block,
            "Reading distribution log history from block {from_block} to {latest_block}"
        );

        let mut cids = Vec::new();
        for (chunk_start, chunk_end) in block_chunks(from_block, latest_block, block_range) {
            let events = self
                .contract
                .DistributionLogUpdated_filter()
                .from_block(chunk_start)
                .to_block(chunk_end)
                .query()
                .await
                .inspect_err(|err| {
                    tracing::error!("Failed to read distribution logs in [{chunk_start}, {chunk_end}]: {err:?}")
                })?;
            cids.extend(events.into_iter().map(|(event, _log)| event.logCid));
        }
        tracing::debug!("Found {} distribution logs", cids.len());
        Ok(cids)
    }

    /// IPFS CIDs of all published distribution logs, oldest first.
    pub async fn get_distribution_log_cids(
        &self,
        from_block: u64,
        block_range: u64,
    ) -> Result<Vec<String>, ContractError> {
        self.log_cids
            .get_or_try_insert_with((), self.cache_settings.records_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_DISTRIBUTION_LOG_CIDS, || {
                        self.get_distribution_log_cids_impl(from_block, block_range)
                    })
            })
            .await
    }
}

pub struct StETHContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    contract: StETHInstance<Arc<P>>,
    metric_reporter: Arc<prometheus_metrics::Service>,
    cache_settings: CacheSettings,
    pooled_eth: TtlCache<u128, u128>,
    transfers: TtlCache<(Address, Address), Vec<SharesTransfer>>,
}

impl<P> StETHContractWrapper<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(
        provider: Arc<P>,
        contract_address: Address,
        metric_reporter: Arc<prometheus_metrics::Service>,
        cache_settings: CacheSettings,
    ) -> Self {
        Self {
            contract: StETHInstance::new(contract_address, provider),
            metric_reporter,
            cache_settings,
            pooled_eth: TtlCache::new(cache_settings.volatile_ttl, cache_settings.max_entries),
            transfers: TtlCache::new(cache_settings.records_ttl, cache_settings.max_entries),
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        self.pooled_eth.cleanup_expired() + self.transfers.cleanup_expired()
    }

    async fn get_pooled_eth_by_shares_impl(&self, shares: u128) -> Result<u128, ContractError> {
        let wei = self.contract.getPooledEthByShares(U256::from(shares)).call().await?;
        Ok(uint256_to_u128(wei)?)
    }

    /// Current ETH value (wei) of `shares` staking token shares.
    pub async fn get_pooled_eth_by_shares(&self, shares: u128) -> Result<u128, ContractError> {
        if shares == 0 {
            return Ok(0);
        }
        self.pooled_eth
            .get_or_try_insert_with(shares, self.cache_settings.volatile_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_POOLED_ETH_BY_SHARES, || {
                        self.get_pooled_eth_by_shares_impl(shares)
                    })
            })
            .await
    }

    async fn get_shares_transfers_impl(
        &self,
        from: Address,
        to: Address,
        from_block: u64,
        block_range: u64,
    ) -> Result<Vec<SharesTransfer>, ContractError> {
        let latest_block = self.contract.provider().get_block_number().await?;
        tracing::info!(%from, %to, "Reading share transfers from block {from_block} to {latest_block}");

        let mut transfers = Vec::new();
        for (chunk_start, chunk_end) in block_chunks(from_block, latest_block, block_range) {
            let events = self
                .contract
                .TransferShares_filter()
                .topic1(from)
                .topic2(to)
                .from_block(chunk_start)
                .to_block(chunk_end)
                .query()
                .await
                .inspect_err(|err| {
                    tracing::error!("Failed to read share transfers in [{chunk_start}, {chunk_end}]: {err:?}")
                })?;
            for (event, log) in events {
                transfers.push(SharesTransfer {
                    block_number: log.block_number.unwrap_or(chunk_start),
                    block_timestamp: log.block_timestamp,
                    tx_hash: log.transaction_hash.unwrap_or_default(),
                    shares: uint256_to_u128(event.sharesValue)?,
                });
            }
        }
        tracing::debug!("Found {} share transfers", transfers.len());
        Ok(transfers)
    }

    /// Every `TransferShares` from `from` to `to`, oldest first.
    pub async fn get_shares_transfers(
        &self,
        from: Address,
        to: Address,
        from_block: u64,
        block_range: u64,
    ) -> Result<Vec<SharesTransfer>, ContractError> {
        self.transfers
            .get_or_try_insert_with((from, to), self.cache_settings.records_ttl, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(ops::GET_SHARES_TRANSFERS, || {
                        self.get_shares_transfers_impl(from, to, from_block, block_range)
                    })
            })
            .await
    }
}

pub type DefaultProvider = DynProvider<Ethereum>;

pub type CSModuleContract = CSModuleContractWrapper<DefaultProvider>;
pub type CSAccountingContract = CSAccountingContractWrapper<DefaultProvider>;
pub type CSFeeDistributorContract = CSFeeDistributorContractWrapper<DefaultProvider>;
pub type StETHContract = StETHContractWrapper<DefaultProvider>;

pub struct ProviderFactory {}
impl ProviderFactory {
    /// Read-only provider: nothing here ever signs or sends a transaction.
    pub fn create_provider(endpoint: Url) -> DefaultProvider {
        ProviderBuilder::new().connect_http(endpoint).erased()
    }
}
