//! Reward arithmetic.
//!
//! Amounts are kept as integer wei/shares until the very last step, and only converted to
//! floating point ETH for presentation. Percentages are rounded to 2 decimals, ETH amounts
//! derived from rates to 6 decimals.

use crate::csm::{ApyMetrics, DistributionFrame};
use crate::eth_spec::{self, CSM_FRAME_EPOCHS};
use crate::util::round_to;

pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_YEAR: f64 = 365.0;
/// Nominal frame length used to extrapolate the next distribution.
pub const FRAME_DAYS: f64 = 28.0;

pub fn wei_to_eth(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETH as f64
}

/// Rewards earned but not yet claimed. A tree lagging behind on-chain claims yields zero,
/// never an underflow.
pub fn unclaimed_shares(cumulative_shares: u128, distributed_shares: u128) -> u128 {
    cumulative_shares.saturating_sub(distributed_shares)
}

pub fn total_claimable_eth(excess_bond_eth: f64, unclaimed_eth: f64) -> f64 {
    excess_bond_eth + unclaimed_eth
}

pub fn frame_duration_days(start_epoch: u64, end_epoch: u64) -> f64 {
    let epochs = end_epoch.saturating_sub(start_epoch);
    epochs.saturating_mul(eth_spec::seconds_per_epoch()) as f64 / SECONDS_PER_DAY
}

/// Annualizes `earned / principal` over `days`, as a percentage.
pub fn annualized_percent(earned_eth: f64, principal_eth: f64, days: f64) -> Option<f64> {
    if principal_eth <= 0.0 || days <= 0.0 {
        return None;
    }
    Some(round_to(earned_eth / principal_eth * (DAYS_PER_YEAR / days) * 100.0, 2))
}

/// Bond appreciation from the staking token rebase over `days`.
pub fn bond_rebase_eth(bond_eth: f64, apr_percent: f64, days: f64) -> f64 {
    round_to(bond_eth * (apr_percent / 100.0) * (days / DAYS_PER_YEAR), 6)
}

/// Operator rewards for one frame, with shares already priced in ETH.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRewards {
    pub start_epoch: u64,
    pub end_epoch: u64,
    pub distributed_shares: u128,
    pub distributed_eth: f64,
}

impl FrameRewards {
    pub fn duration_days(&self) -> f64 {
        frame_duration_days(self.start_epoch, self.end_epoch)
    }
}

fn add_optional(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    match (left, right) {
        (None, None) => None,
        (l, r) => Some(round_to(l.unwrap_or(0.0) + r.unwrap_or(0.0), 6)),
    }
}

/// Derives reward and bond yields from an operator's distribution history.
///
/// `frames` must be ordered oldest first; the last frame is the "current" one and the one
/// before it "previous". `bond_apr` is the staking token APR in percent, if known.
pub fn compute_apy_metrics(
    bond_eth: f64,
    frames: &[FrameRewards],
    bond_apr: Option<f64>,
    include_history: bool,
) -> ApyMetrics {
    let mut metrics = ApyMetrics {
        bond_apy: bond_apr,
        ..Default::default()
    };

    let current = frames.last();
    let previous = frames.len().checked_sub(2).and_then(|idx| frames.get(idx));

    if let Some(current) = current {
        let days = current.duration_days();
        metrics.current_distribution_eth = Some(current.distributed_eth);
        metrics.current_distribution_apy = annualized_percent(current.distributed_eth, bond_eth, days);
        metrics.reward_apy_28d = metrics.current_distribution_apy;

        metrics.next_distribution_date = current
            .end_epoch
            .checked_add(CSM_FRAME_EPOCHS)
            .and_then(eth_spec::epoch_to_datetime);
        if days > 0.0 {
            metrics.next_distribution_est_eth = Some(current.distributed_eth / days * FRAME_DAYS);
        }
    }

    if let Some(previous) = previous {
        metrics.previous_distribution_eth = Some(previous.distributed_eth);
        metrics.previous_distribution_apy =
            annualized_percent(previous.distributed_eth, bond_eth, previous.duration_days());
    }

    let total_days: f64 = frames.iter().map(FrameRewards::duration_days).sum();
    if !frames.is_empty() {
        let lifetime_eth: f64 = frames.iter().map(|frame| frame.distributed_eth).sum();
        metrics.lifetime_distribution_eth = Some(lifetime_eth);
        if lifetime_eth > 0.0 {
            metrics.reward_apy_ltd = annualized_percent(lifetime_eth, bond_eth, total_days);
        }
    }

    if let Some(apr) = bond_apr {
        metrics.net_apy_28d = Some(round_to(metrics.reward_apy_28d.unwrap_or(0.0) + apr, 2));
        metrics.net_apy_ltd = Some(round_to(metrics.reward_apy_ltd.unwrap_or(0.0) + apr, 2));
        metrics.previous_net_apy = metrics
            .previous_distribution_apy
            .map(|reward_apy| round_to(reward_apy + apr, 2));

        if bond_eth > 0.0 {
            metrics.previous_bond_eth = previous.map(|frame| bond_rebase_eth(bond_eth, apr, frame.duration_days()));
            metrics.current_bond_eth = current.map(|frame| bond_rebase_eth(bond_eth, apr, frame.duration_days()));
            if !frames.is_empty() {
                metrics.lifetime_bond_eth = Some(bond_rebase_eth(bond_eth, apr, total_days));
            }
        }
    }

    metrics.previous_net_total_eth = add_optional(metrics.previous_distribution_eth, metrics.previous_bond_eth);
    metrics.current_net_total_eth = add_optional(metrics.current_distribution_eth, metrics.current_bond_eth);
    metrics.lifetime_net_total_eth = add_optional(metrics.lifetime_distribution_eth, metrics.lifetime_bond_eth);

    if include_history && !frames.is_empty() {
        let history = frames
            .iter()
            .enumerate()
            .map(|(idx, frame)| {
                let days = frame.duration_days();
                DistributionFrame {
                    frame_number: u32::try_from(idx + 1).unwrap_or(u32::MAX),
                    start_epoch: frame.start_epoch,
                    end_epoch: frame.end_epoch,
                    start_date: eth_spec::epoch_to_datetime(frame.start_epoch),
                    end_date: eth_spec::epoch_to_datetime(frame.end_epoch),
                    distributed_shares: frame.distributed_shares,
                    distributed_eth: frame.distributed_eth,
                    duration_days: round_to(days, 1),
                    apy: annualized_percent(frame.distributed_eth, bond_eth, days),
                }
            })
            .collect();
        metrics.frames = Some(history);
    }

    metrics
}
