use std::collections::BTreeMap;
use std::str::FromStr;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::csm::{ApyMetrics, HealthStatus, NodeOperatorId, OperatorRewards, ValidatorInfo, WithdrawalEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorIdentifier {
    Id(NodeOperatorId),
    Address(Address),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Invalid identifier format")]
    InvalidFormat,

    #[error("Invalid address {value:?}: {reason}")]
    InvalidAddress { value: String, reason: String },
}

impl FromStr for OperatorIdentifier {
    type Err = IdentifierError;

    /// All digits is an operator id, `0x`-prefixed is an address, anything else is rejected.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            value
                .parse::<u64>()
                .map(|id| Self::Id(NodeOperatorId(id)))
                .map_err(|_| IdentifierError::InvalidFormat)
        } else if value.starts_with("0x") || value.starts_with("0X") {
            Address::from_str(value)
                .map(Self::Address)
                .map_err(|e| IdentifierError::InvalidAddress {
                    value: value.to_owned(),
                    reason: e.to_string(),
                })
        } else {
            Err(IdentifierError::InvalidFormat)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardsSection {
    pub current_bond_eth: f64,
    pub required_bond_eth: f64,
    pub excess_bond_eth: f64,
    pub cumulative_rewards_shares: u128,
    pub cumulative_rewards_eth: f64,
    pub distributed_shares: u128,
    pub distributed_eth: f64,
    pub unclaimed_shares: u128,
    pub unclaimed_eth: f64,
    pub total_claimable_eth: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_valid: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorsSection {
    pub total: u32,
    pub active: u32,
    pub exited: u32,
}

/// Operator snapshot as served by `/api/operator/...` and printed by `csm check --json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorResponse {
    pub operator_id: NodeOperatorId,
    pub manager_address: Address,
    pub reward_address: Address,
    pub rewards: RewardsSection,
    pub validators: ValidatorsSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_details: Option<Vec<ValidatorInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validators_by_status: Option<BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_effectiveness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apy: Option<ApyMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<WithdrawalEvent>>,
}

impl From<&OperatorRewards> for OperatorResponse {
    fn from(value: &OperatorRewards) -> Self {
        let details = value.details.as_ref();
        Self {
            operator_id: value.node_operator_id,
            manager_address: value.manager_address,
            reward_address: value.reward_address,
            rewards: RewardsSection {
                current_bond_eth: value.bond.current_bond_eth(),
                required_bond_eth: value.bond.required_bond_eth(),
                excess_bond_eth: value.bond.excess_bond_eth(),
                cumulative_rewards_shares: value.cumulative_rewards_shares,
                cumulative_rewards_eth: value.cumulative_rewards_eth,
                distributed_shares: value.distributed_shares,
                distributed_eth: value.distributed_eth,
                unclaimed_shares: value.unclaimed_shares,
                unclaimed_eth: value.unclaimed_eth,
                total_claimable_eth: value.total_claimable_eth,
                proof_valid: value.proof_valid,
            },
            validators: ValidatorsSection {
                total: value.total_validators,
                active: value.active_validators,
                exited: value.exited_validators,
            },
            validator_details: details.map(|d| d.validators.clone()),
            validators_by_status: details.map(|d| d.validators_by_status.clone()),
            active_since: details.and_then(|d| d.active_since),
            health: details.map(|d| d.health.clone()),
            avg_effectiveness: details.and_then(|d| d.avg_effectiveness),
            apy: details.and_then(|d| d.apy.clone()),
            withdrawals: value.withdrawals.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorListResponse {
    pub count: usize,
    pub operator_ids: Vec<NodeOperatorId>,
}

impl From<Vec<NodeOperatorId>> for OperatorListResponse {
    fn from(operator_ids: Vec<NodeOperatorId>) -> Self {
        Self {
            count: operator_ids.len(),
            operator_ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
