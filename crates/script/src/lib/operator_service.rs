use std::sync::Arc;

use alloy::primitives::{Address, B256};
use csm_dashboard_shared::csm::{
    BondSummary, NodeOperator, NodeOperatorId, OperatorDetails, OperatorRewards, WithdrawalEvent,
};
use csm_dashboard_shared::eth_spec;
use csm_dashboard_shared::io::api::OperatorIdentifier;
use csm_dashboard_shared::io::rewards_tree::RewardsTree;
use csm_dashboard_shared::rewards::{self, FrameRewards};
use csm_dashboard_shared::{merkle_proof, validators};
use futures::future::try_join_all;
use thiserror::Error;
use tracing::Instrument;

use crate::beacon_api::BeaconApiClient;
use crate::eth_client::{
    CSAccountingContract, CSFeeDistributorContract, CSModuleContract, ContractError, StETHContract,
};
use crate::ipfs_logs::{IpfsLogClient, OperatorFrame};
use crate::lido_api::LidoApiClient;
use crate::rewards_tree::{DefaultRewardsTreeReader, RewardsTreeReader};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Contract read failed: {0}")]
    Contract(#[from] ContractError),

    #[error("Failed to read rewards tree: {0:#}")]
    RewardsTree(anyhow::Error),

    #[error("Failed to read validators: {0:#}")]
    Validators(anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Signing keys, beacon-chain status, health and APY.
    pub include_validators: bool,
    /// Per-frame distribution history; only used together with `include_validators`.
    pub include_history: bool,
    /// Rewards claims paid out to the reward address.
    pub include_withdrawals: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LookupSettings {
    pub lookup_concurrency: usize,
    /// First block scanned for distribution logs and rewards claims.
    pub distribution_log_from_block: u64,
    pub distribution_log_block_range: u64,
}

pub struct OperatorService<T = DefaultRewardsTreeReader> {
    pub csmodule: CSModuleContract,
    pub accounting: CSAccountingContract,
    pub fee_distributor: CSFeeDistributorContract,
    pub steth: StETHContract,
    pub rewards_tree: T,
    pub beacon_api: BeaconApiClient,
    pub lido_api: LidoApiClient,
    pub ipfs_logs: IpfsLogClient,
    pub settings: LookupSettings,
}

impl<T: RewardsTreeReader + Sync> OperatorService<T> {
    pub async fn lookup(
        &self,
        identifier: &OperatorIdentifier,
        options: LookupOptions,
    ) -> Result<Option<OperatorRewards>, Error> {
        match identifier {
            OperatorIdentifier::Id(id) => self.get_operator_by_id(*id, options).await,
            OperatorIdentifier::Address(address) => self.get_operator_by_address(*address, options).await,
        }
    }

    pub async fn get_operator_by_address(
        &self,
        address: Address,
        options: LookupOptions,
    ) -> Result<Option<OperatorRewards>, Error> {
        let span = tracing::info_span!("get_operator_by_address", %address);
        async {
            let operator = self
                .csmodule
                .find_operator_by_address(address, self.settings.lookup_concurrency)
                .await?;
            match operator {
                Some(operator) => self.build_rewards(operator, options).await.map(Some),
                None => Ok(None),
            }
        }
        .instrument(span)
        .await
    }

    /// `None` when no operator with this id has been registered yet.
    pub async fn get_operator_by_id(
        &self,
        id: NodeOperatorId,
        options: LookupOptions,
    ) -> Result<Option<OperatorRewards>, Error> {
        let span = tracing::info_span!("get_operator_by_id", operator_id = id.0);
        async {
            let count = self.csmodule.get_node_operators_count().await?;
            if id.0 >= count {
                tracing::info!("Operator {id} does not exist, {count} operators registered");
                return Ok(None);
            }
            let operator = self.csmodule.get_node_operator(id).await?;
            self.build_rewards(operator, options).await.map(Some)
        }
        .instrument(span)
        .await
    }

    /// Ids of every operator present in the rewards tree, ascending.
    pub async fn get_all_operators_with_rewards(&self) -> Result<Vec<NodeOperatorId>, Error> {
        let tree = self.rewards_tree.read_tree().await.map_err(Error::RewardsTree)?;
        Ok(tree.operator_ids())
    }

    /// Drops expired entries from every read cache, returning how many were dropped.
    pub fn cleanup_expired_caches(&self) -> usize {
        self.csmodule.cleanup_expired()
            + self.accounting.cleanup_expired()
            + self.fee_distributor.cleanup_expired()
            + self.steth.cleanup_expired()
            + self.rewards_tree.cleanup_expired()
            + self.ipfs_logs.cleanup_expired()
    }

    /// A tree that can't be read counts as empty: the operator is still reported, with no
    /// cumulative rewards and no proof check.
    async fn read_tree_or_empty(&self) -> Arc<RewardsTree> {
        self.rewards_tree.read_tree().await.unwrap_or_else(|e| {
            tracing::warn!("Rewards tree unavailable, reporting no cumulative rewards: {e:?}");
            Arc::new(RewardsTree::default())
        })
    }

    async fn read_tree_root(&self) -> Option<B256> {
        self.fee_distributor
            .get_tree_root()
            .await
            .inspect_err(|e| tracing::warn!("Tree root unavailable, skipping proof check: {e:?}"))
            .ok()
    }

    async fn build_rewards(&self, operator: NodeOperator, options: LookupOptions) -> Result<OperatorRewards, Error> {
        let id = operator.id;

        let (bond, tree, distributed_shares, tree_root) = tokio::try_join!(
            async { self.accounting.get_bond_summary(id).await.map_err(Error::from) },
            async { Ok::<_, Error>(self.read_tree_or_empty().await) },
            async { self.fee_distributor.get_distributed_shares(id).await.map_err(Error::from) },
            async { Ok::<_, Error>(self.read_tree_root().await) },
        )?;

        let entry = tree.get(id);
        if entry.is_none() {
            tracing::info!("Operator {id} has no entry in the rewards tree yet");
        }
        let cumulative_shares = entry.map(|entry| entry.cumulative_fee_shares).unwrap_or(0);
        let proof_valid = match (entry, tree_root) {
            (Some(entry), Some(root)) => Some(merkle_proof::verify(
                &root,
                id,
                entry.cumulative_fee_shares,
                &entry.proof,
            )),
            _ => None,
        };
        if proof_valid == Some(false) {
            tracing::warn!("Rewards tree entry for operator {id} does not match the on-chain root");
        }

        let unclaimed_shares = rewards::unclaimed_shares(cumulative_shares, distributed_shares);
        let (cumulative_wei, distributed_wei, unclaimed_wei) = tokio::try_join!(
            self.steth.get_pooled_eth_by_shares(cumulative_shares),
            self.steth.get_pooled_eth_by_shares(distributed_shares),
            self.steth.get_pooled_eth_by_shares(unclaimed_shares),
        )?;
        let unclaimed_eth = rewards::wei_to_eth(unclaimed_wei);

        let details = if options.include_validators {
            Some(self.build_details(&operator, &bond, options.include_history).await?)
        } else {
            None
        };
        let withdrawals = if options.include_withdrawals {
            Some(
                self.get_withdrawal_history(&operator)
                    .await
                    .inspect_err(|e| tracing::warn!("Withdrawal history unavailable for operator {id}: {e:?}"))
                    .unwrap_or_default(),
            )
        } else {
            None
        };

        Ok(OperatorRewards {
            node_operator_id: id,
            manager_address: operator.manager_address,
            reward_address: operator.reward_address,
            bond,
            cumulative_rewards_shares: cumulative_shares,
            cumulative_rewards_eth: rewards::wei_to_eth(cumulative_wei),
            distributed_shares,
            distributed_eth: rewards::wei_to_eth(distributed_wei),
            unclaimed_shares,
            unclaimed_eth,
            total_claimable_eth: rewards::total_claimable_eth(bond.excess_bond_eth(), unclaimed_eth),
            proof_valid,
            total_validators: operator.total_deposited_keys,
            active_validators: operator.active_validators(),
            exited_validators: operator.total_exited_keys,
            details,
            withdrawals,
        })
    }

    /// Rewards claims paid to the operator's reward address, oldest first. ETH values use
    /// the current share rate.
    pub async fn get_withdrawal_history(&self, operator: &NodeOperator) -> Result<Vec<WithdrawalEvent>, Error> {
        let transfers = self
            .steth
            .get_shares_transfers(
                *self.accounting.address(),
                operator.reward_address,
                self.settings.distribution_log_from_block,
                self.settings.distribution_log_block_range,
            )
            .await?;

        let events = try_join_all(transfers.into_iter().map(|transfer| async move {
            let wei = self.steth.get_pooled_eth_by_shares(transfer.shares).await?;
            Ok::<_, ContractError>(WithdrawalEvent {
                block_number: transfer.block_number,
                timestamp: transfer.block_timestamp.and_then(eth_spec::timestamp_to_datetime),
                tx_hash: transfer.tx_hash,
                shares: transfer.shares,
                eth_value: rewards::wei_to_eth(wei),
            })
        }))
        .await?;
        Ok(events)
    }

    async fn build_details(
        &self,
        operator: &NodeOperator,
        bond: &BondSummary,
        include_history: bool,
    ) -> Result<OperatorDetails, Error> {
        let pubkeys = self
            .csmodule
            .get_signing_keys(operator.id, u64::from(operator.total_deposited_keys))
            .await?;

        let (validators, history, bond_apr) = tokio::join!(
            async {
                if pubkeys.is_empty() {
                    Ok(vec![])
                } else {
                    self.beacon_api.get_validators_by_pubkeys(&pubkeys).await
                }
            },
            self.get_distribution_history(operator.id),
            async {
                self.lido_api
                    .get_steth_apr()
                    .await
                    .inspect_err(|e| tracing::warn!("stETH APR unavailable: {e:?}"))
                    .ok()
            },
        );
        let validators = validators.map_err(Error::Validators)?;

        let recent = history
            .iter()
            .rev()
            .take(validators::STRIKES_LIFETIME_FRAMES)
            .map(|frame| &frame.validators);
        let strikes = validators::strike_summary(&validators::accumulate_strikes(recent));
        let avg_effectiveness = history
            .last()
            .and_then(|frame| validators::average_effectiveness(&frame.validators));

        // Yield figures are best effort: a failing source leaves its fields empty
        let bond_eth = bond.current_bond_eth();
        let frames = if bond_eth > 0.0 {
            self.price_frames(&history)
                .await
                .inspect_err(|e| tracing::warn!("Failed to price distribution history for operator {}: {e:?}", operator.id))
                .unwrap_or_default()
        } else {
            vec![]
        };

        Ok(OperatorDetails {
            validators_by_status: validators::aggregate_validator_status(&validators),
            active_since: validators::earliest_activation(&validators),
            health: validators::health_status(operator, bond, &validators, strikes),
            avg_effectiveness,
            apy: Some(rewards::compute_apy_metrics(bond_eth, &frames, bond_apr, include_history)),
            validators,
        })
    }

    /// The operator's frames from every published distribution log, oldest first. Empty
    /// when the log history can't be read.
    async fn get_distribution_history(&self, id: NodeOperatorId) -> Vec<OperatorFrame> {
        let cids = self
            .fee_distributor
            .get_distribution_log_cids(
                self.settings.distribution_log_from_block,
                self.settings.distribution_log_block_range,
            )
            .await;
        match cids {
            Ok(cids) => self.ipfs_logs.get_operator_history(id, &cids).await,
            Err(e) => {
                tracing::warn!("Distribution history unavailable for operator {id}: {e:?}");
                vec![]
            }
        }
    }

    async fn price_frames(&self, history: &[OperatorFrame]) -> Result<Vec<FrameRewards>, ContractError> {
        try_join_all(history.iter().map(|frame| async move {
            let wei = self.steth.get_pooled_eth_by_shares(frame.distributed_shares).await?;
            Ok::<_, ContractError>(FrameRewards {
                start_epoch: frame.start_epoch,
                end_epoch: frame.end_epoch,
                distributed_shares: frame.distributed_shares,
                distributed_eth: rewards::wei_to_eth(wei),
            })
        }))
        .await
    }
}
