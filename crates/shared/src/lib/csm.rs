use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eth_spec::GWEI_PER_ETH;
use crate::io::serde_utils::serde_hex_as_string;
use crate::rewards::wei_to_eth;
use crate::util::{uint256_to_u64, ConversionError};

pub const BLS_PUBKEY_LENGTH: usize = 48;
pub type BlsPubkey = [u8; BLS_PUBKEY_LENGTH];

#[derive(
    PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Serialize, Deserialize, derive_more::FromStr,
)]
#[serde(transparent)]
pub struct NodeOperatorId(pub u64);

impl fmt::Display for NodeOperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<U256> for NodeOperatorId {
    type Error = ConversionError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        uint256_to_u64(value).map(NodeOperatorId)
    }
}

impl From<NodeOperatorId> for U256 {
    fn from(value: NodeOperatorId) -> Self {
        U256::from(value.0)
    }
}

/// Node operator record as stored by the CSM staking module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOperator {
    pub id: NodeOperatorId,
    pub total_added_keys: u32,
    pub total_withdrawn_keys: u32,
    pub total_deposited_keys: u32,
    pub total_vetted_keys: u32,
    pub stuck_validators_count: u32,
    pub depositable_validators_count: u32,
    pub target_limit: u32,
    pub target_limit_mode: u8,
    pub total_exited_keys: u32,
    pub enqueued_count: u32,
    pub manager_address: Address,
    pub proposed_manager_address: Address,
    pub reward_address: Address,
    pub proposed_reward_address: Address,
    pub extended_manager_permissions: bool,
}

impl NodeOperator {
    pub fn active_validators(&self) -> u32 {
        self.total_deposited_keys.saturating_sub(self.total_exited_keys)
    }

    /// Address equality is byte-wise, so checksum casing of the input doesn't matter.
    pub fn is_controlled_by(&self, address: &Address) -> bool {
        self.manager_address == *address || self.reward_address == *address
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondSummary {
    pub current_bond_wei: u128,
    pub required_bond_wei: u128,
}

impl BondSummary {
    pub fn new(current_bond_wei: u128, required_bond_wei: u128) -> Self {
        Self {
            current_bond_wei,
            required_bond_wei,
        }
    }

    pub fn excess_bond_wei(&self) -> u128 {
        self.current_bond_wei.saturating_sub(self.required_bond_wei)
    }

    pub fn bond_deficit_wei(&self) -> u128 {
        self.required_bond_wei.saturating_sub(self.current_bond_wei)
    }

    pub fn is_healthy(&self) -> bool {
        self.current_bond_wei >= self.required_bond_wei
    }

    pub fn current_bond_eth(&self) -> f64 {
        wei_to_eth(self.current_bond_wei)
    }

    pub fn required_bond_eth(&self) -> f64 {
        wei_to_eth(self.required_bond_wei)
    }

    pub fn excess_bond_eth(&self) -> f64 {
        wei_to_eth(self.excess_bond_wei())
    }

    pub fn bond_deficit_eth(&self) -> f64 {
        wei_to_eth(self.bond_deficit_wei())
    }
}

/// Entry of the published rewards Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsInfo {
    pub cumulative_fee_shares: u128,
    pub proof: Vec<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValidatorStatus {
    Pending,
    Deposited,
    ActiveOnline,
    ActiveOffline,
    ExitingOnline,
    ExitingOffline,
    SlashingOnline,
    SlashingOffline,
    Exited,
    Slashed,
    Unknown(String),
}

impl ValidatorStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Deposited => "deposited",
            Self::ActiveOnline => "active_online",
            Self::ActiveOffline => "active_offline",
            Self::ExitingOnline => "exiting_online",
            Self::ExitingOffline => "exiting_offline",
            Self::SlashingOnline => "slashing_online",
            Self::SlashingOffline => "slashing_offline",
            Self::Exited => "exited",
            Self::Slashed => "slashed",
            Self::Unknown(raw) => raw,
        }
    }

    /// Still attesting (or expected to): active or in the exit queue.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::ActiveOnline | Self::ActiveOffline | Self::ExitingOnline | Self::ExitingOffline
        )
    }

    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            Self::ActiveOffline | Self::ExitingOffline | Self::SlashingOffline
        )
    }
}

impl From<String> for ValidatorStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "deposited" => Self::Deposited,
            "active_online" => Self::ActiveOnline,
            "active_offline" => Self::ActiveOffline,
            "exiting_online" => Self::ExitingOnline,
            "exiting_offline" => Self::ExitingOffline,
            "slashing_online" => Self::SlashingOnline,
            "slashing_offline" => Self::SlashingOffline,
            "exited" => Self::Exited,
            "slashed" => Self::Slashed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ValidatorStatus> for String {
    fn from(value: ValidatorStatus) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    #[serde(with = "serde_hex_as_string::FixedHexStringProtocol::<BLS_PUBKEY_LENGTH>")]
    pub pubkey: BlsPubkey,
    pub index: Option<u64>,
    pub status: ValidatorStatus,
    pub balance_gwei: u64,
    pub effective_balance_gwei: u64,
    pub slashed: bool,
    pub activation_epoch: Option<u64>,
    pub exit_epoch: Option<u64>,
}

impl ValidatorInfo {
    pub fn balance_eth(&self) -> f64 {
        self.balance_gwei as f64 / GWEI_PER_ETH as f64
    }

    /// Placeholder for keys the explorer doesn't know about yet.
    pub fn unknown(pubkey: BlsPubkey) -> Self {
        Self {
            pubkey,
            index: None,
            status: ValidatorStatus::Unknown("unknown".to_owned()),
            balance_gwei: 0,
            effective_balance_gwei: 0,
            slashed: false,
            activation_epoch: None,
            exit_epoch: None,
        }
    }
}

/// One validator's duties and strikes in a distribution frame, as reported by the
/// performance oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorFramePerformance {
    pub assigned: u64,
    pub included: u64,
    pub strikes: u32,
}

impl ValidatorFramePerformance {
    /// Share of assigned attestations that were included, in percent.
    pub fn effectiveness(&self) -> Option<f64> {
        (self.assigned > 0).then(|| self.included as f64 / self.assigned as f64 * 100.0)
    }

    pub fn merge(&mut self, other: &Self) {
        self.assigned = self.assigned.saturating_add(other.assigned);
        self.included = self.included.saturating_add(other.included);
        self.strikes = self.strikes.saturating_add(other.strikes);
    }
}

/// Strikes accumulated by the operator's validators over the strikes lifetime window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeSummary {
    pub total_validators_with_strikes: u32,
    /// At or above the ejection threshold.
    pub validators_at_risk: u32,
    /// One strike below the ejection threshold.
    pub validators_near_ejection: u32,
    pub total_strikes: u32,
    pub max_strikes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub bond_healthy: bool,
    pub bond_deficit_eth: f64,
    pub stuck_validators_count: u32,
    pub slashed_validators_count: u32,
    pub validators_at_risk_count: u32,
    #[serde(default)]
    pub strikes: StrikeSummary,
}

impl HealthStatus {
    pub fn has_issues(&self) -> bool {
        !self.bond_healthy
            || self.stuck_validators_count > 0
            || self.slashed_validators_count > 0
            || self.validators_at_risk_count > 0
            || self.strikes.validators_at_risk > 0
    }
}

/// A rewards claim paid out to the operator's reward address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub block_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub tx_hash: B256,
    pub shares: u128,
    pub eth_value: f64,
}

/// Rewards an operator received in a single distribution frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionFrame {
    pub frame_number: u32,
    pub start_epoch: u64,
    pub end_epoch: u64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub distributed_shares: u128,
    pub distributed_eth: f64,
    pub duration_days: f64,
    pub apy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApyMetrics {
    pub previous_distribution_eth: Option<f64>,
    pub previous_distribution_apy: Option<f64>,
    pub previous_net_apy: Option<f64>,
    pub current_distribution_eth: Option<f64>,
    pub current_distribution_apy: Option<f64>,
    pub lifetime_distribution_eth: Option<f64>,
    pub reward_apy_28d: Option<f64>,
    pub reward_apy_ltd: Option<f64>,
    pub bond_apy: Option<f64>,
    pub net_apy_28d: Option<f64>,
    pub net_apy_ltd: Option<f64>,
    pub previous_bond_eth: Option<f64>,
    pub current_bond_eth: Option<f64>,
    pub lifetime_bond_eth: Option<f64>,
    pub previous_net_total_eth: Option<f64>,
    pub current_net_total_eth: Option<f64>,
    pub lifetime_net_total_eth: Option<f64>,
    pub next_distribution_date: Option<DateTime<Utc>>,
    pub next_distribution_est_eth: Option<f64>,
    pub frames: Option<Vec<DistributionFrame>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDetails {
    pub validators: Vec<ValidatorInfo>,
    pub validators_by_status: BTreeMap<String, u64>,
    pub active_since: Option<DateTime<Utc>>,
    pub health: HealthStatus,
    /// Mean attestation effectiveness over the latest distribution frame, in percent.
    pub avg_effectiveness: Option<f64>,
    pub apy: Option<ApyMetrics>,
}

/// Point-in-time rewards snapshot for one operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRewards {
    pub node_operator_id: NodeOperatorId,
    pub manager_address: Address,
    pub reward_address: Address,
    pub bond: BondSummary,
    pub cumulative_rewards_shares: u128,
    pub cumulative_rewards_eth: f64,
    pub distributed_shares: u128,
    pub distributed_eth: f64,
    pub unclaimed_shares: u128,
    pub unclaimed_eth: f64,
    pub total_claimable_eth: f64,
    pub proof_valid: Option<bool>,
    pub total_validators: u32,
    pub active_validators: u32,
    pub exited_validators: u32,
    pub details: Option<OperatorDetails>,
    pub withdrawals: Option<Vec<WithdrawalEvent>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn operator(manager: Address, reward: Address) -> NodeOperator {
        NodeOperator {
            id: NodeOperatorId(7),
            total_added_keys: 10,
            total_withdrawn_keys: 0,
            total_deposited_keys: 8,
            total_vetted_keys: 10,
            stuck_validators_count: 0,
            depositable_validators_count: 2,
            target_limit: 0,
            target_limit_mode: 0,
            total_exited_keys: 3,
            enqueued_count: 2,
            manager_address: manager,
            proposed_manager_address: Address::ZERO,
            reward_address: reward,
            proposed_reward_address: Address::ZERO,
            extended_manager_permissions: false,
        }
    }

    #[test]
    fn operator_id_parse_and_display() {
        let id: NodeOperatorId = "42".parse().expect("should parse");
        assert_eq!(id, NodeOperatorId(42));
        assert_eq!(id.to_string(), "42");
        assert!("x42".parse::<NodeOperatorId>().is_err());
        assert_eq!(NodeOperatorId::try_from(U256::from(42)).unwrap(), id);
        assert!(NodeOperatorId::try_from(U256::MAX).is_err());
    }

    #[test]
    fn operator_control() {
        let manager = address!("1111111111111111111111111111111111111111");
        let reward = address!("2222222222222222222222222222222222222222");
        let op = operator(manager, reward);

        assert!(op.is_controlled_by(&manager));
        assert!(op.is_controlled_by(&reward));
        assert!(!op.is_controlled_by(&Address::ZERO));
        assert_eq!(op.active_validators(), 5);
    }

    #[test]
    fn active_validators_saturates() {
        let mut op = operator(Address::ZERO, Address::ZERO);
        op.total_exited_keys = 20;
        assert_eq!(op.active_validators(), 0);
    }

    #[test]
    fn bond_summary_excess_and_deficit() {
        let eth = 1_000_000_000_000_000_000u128;
        let healthy = BondSummary::new(5 * eth, 3 * eth);
        assert_eq!(healthy.excess_bond_wei(), 2 * eth);
        assert_eq!(healthy.bond_deficit_wei(), 0);
        assert!(healthy.is_healthy());
        assert_eq!(healthy.excess_bond_eth(), 2.0);

        let short = BondSummary::new(eth, 3 * eth);
        assert_eq!(short.excess_bond_wei(), 0);
        assert_eq!(short.bond_deficit_eth(), 2.0);
        assert!(!short.is_healthy());
    }

    #[test]
    fn validator_status_strings() {
        assert_eq!(ValidatorStatus::from("active_online".to_owned()), ValidatorStatus::ActiveOnline);
        assert_eq!(ValidatorStatus::from("EXITED".to_owned()), ValidatorStatus::Exited);
        let unknown = ValidatorStatus::from("withdrawal_done".to_owned());
        assert_eq!(unknown, ValidatorStatus::Unknown("withdrawal_done".to_owned()));
        assert_eq!(unknown.to_string(), "withdrawal_done");

        assert!(ValidatorStatus::ExitingOffline.is_active());
        assert!(ValidatorStatus::ExitingOffline.is_offline());
        assert!(!ValidatorStatus::Exited.is_active());
    }

    #[test]
    fn validator_info_serde() {
        let info = ValidatorInfo {
            pubkey: [0xab; BLS_PUBKEY_LENGTH],
            index: Some(12),
            status: ValidatorStatus::ActiveOnline,
            balance_gwei: 32_010_000_000,
            effective_balance_gwei: 32_000_000_000,
            slashed: false,
            activation_epoch: Some(300_000),
            exit_epoch: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "active_online");
        assert_eq!(json["pubkey"], format!("0x{}", "ab".repeat(BLS_PUBKEY_LENGTH)));

        let back: ValidatorInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
        assert_eq!(info.balance_eth(), 32.01);
    }

    #[test]
    fn health_issues() {
        let mut health = HealthStatus {
            bond_healthy: true,
            bond_deficit_eth: 0.0,
            stuck_validators_count: 0,
            slashed_validators_count: 0,
            validators_at_risk_count: 0,
            strikes: StrikeSummary::default(),
        };
        assert!(!health.has_issues());
        health.validators_at_risk_count = 1;
        assert!(health.has_issues());

        health.validators_at_risk_count = 0;
        health.strikes.validators_near_ejection = 1;
        assert!(!health.has_issues());
        health.strikes.validators_at_risk = 1;
        assert!(health.has_issues());
    }

    #[test]
    fn frame_performance() {
        let mut perf = ValidatorFramePerformance {
            assigned: 200,
            included: 150,
            strikes: 1,
        };
        assert_eq!(perf.effectiveness(), Some(75.0));
        perf.merge(&ValidatorFramePerformance {
            assigned: 200,
            included: 200,
            strikes: 2,
        });
        assert_eq!(perf.effectiveness(), Some(87.5));
        assert_eq!(perf.strikes, 3);
        assert_eq!(ValidatorFramePerformance::default().effectiveness(), None);
    }
}
