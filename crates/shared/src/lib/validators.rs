use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::csm::{BondSummary, HealthStatus, NodeOperator, StrikeSummary, ValidatorFramePerformance, ValidatorInfo};
use crate::util::round_to;
use crate::eth_spec::{self, GWEI_PER_ETH};

/// Active validators below this balance have been leaking (offline, penalized) and are flagged.
pub const AT_RISK_BALANCE_GWEI: u64 = 31 * GWEI_PER_ETH;

/// Strikes expire after this many distribution frames.
pub const STRIKES_LIFETIME_FRAMES: usize = 6;

/// Validators reaching this many live strikes are up for ejection.
pub const STRIKES_THRESHOLD: u32 = 3;

/// Frame performance keyed by validator index.
pub type FramePerformance = BTreeMap<u64, ValidatorFramePerformance>;

pub fn aggregate_validator_status(validators: &[ValidatorInfo]) -> BTreeMap<String, u64> {
    validators
        .iter()
        .counts_by(|validator| validator.status.as_str().to_owned())
        .into_iter()
        .map(|(status, count)| (status, count as u64))
        .collect()
}

pub fn count_slashed_validators(validators: &[ValidatorInfo]) -> u32 {
    count(validators.iter().filter(|validator| validator.slashed))
}

pub fn is_at_risk(validator: &ValidatorInfo) -> bool {
    validator.status.is_active()
        && !validator.slashed
        && (validator.status.is_offline() || validator.balance_gwei < AT_RISK_BALANCE_GWEI)
}

pub fn count_at_risk_validators(validators: &[ValidatorInfo]) -> u32 {
    count(validators.iter().filter(|validator| is_at_risk(validator)))
}

/// Date the operator's first validator got activated.
pub fn earliest_activation(validators: &[ValidatorInfo]) -> Option<DateTime<Utc>> {
    validators
        .iter()
        .filter_map(|validator| validator.activation_epoch)
        .filter(|epoch| *epoch != eth_spec::FAR_FUTURE_EPOCH)
        .min()
        .and_then(eth_spec::epoch_to_datetime)
}

/// Live strikes per validator index, summed over `frames` (pass only the frames inside the
/// strikes lifetime).
pub fn accumulate_strikes<'a>(frames: impl IntoIterator<Item = &'a FramePerformance>) -> BTreeMap<u64, u32> {
    let mut strikes: BTreeMap<u64, u32> = BTreeMap::new();
    for frame in frames {
        for (index, performance) in frame {
            let total = strikes.entry(*index).or_default();
            *total = total.saturating_add(performance.strikes);
        }
    }
    strikes
}

pub fn strike_summary(strikes: &BTreeMap<u64, u32>) -> StrikeSummary {
    let struck = || strikes.values().copied().filter(|count| *count > 0);
    StrikeSummary {
        total_validators_with_strikes: saturating_count(struck().count()),
        validators_at_risk: saturating_count(struck().filter(|count| *count >= STRIKES_THRESHOLD).count()),
        validators_near_ejection: saturating_count(
            struck().filter(|count| *count == STRIKES_THRESHOLD - 1).count(),
        ),
        total_strikes: struck().fold(0u32, u32::saturating_add),
        max_strikes: struck().max().unwrap_or(0),
    }
}

/// Mean of per-validator effectiveness, skipping validators with no assigned duties.
pub fn average_effectiveness(frame: &FramePerformance) -> Option<f64> {
    let values: Vec<f64> = frame.values().filter_map(ValidatorFramePerformance::effectiveness).collect();
    if values.is_empty() {
        return None;
    }
    Some(round_to(values.iter().sum::<f64>() / values.len() as f64, 2))
}

pub fn health_status(
    operator: &NodeOperator,
    bond: &BondSummary,
    validators: &[ValidatorInfo],
    strikes: StrikeSummary,
) -> HealthStatus {
    HealthStatus {
        bond_healthy: bond.is_healthy(),
        bond_deficit_eth: bond.bond_deficit_eth(),
        stuck_validators_count: operator.stuck_validators_count,
        slashed_validators_count: count_slashed_validators(validators),
        validators_at_risk_count: count_at_risk_validators(validators),
        strikes,
    }
}

fn count<'a>(iter: impl Iterator<Item = &'a ValidatorInfo>) -> u32 {
    saturating_count(iter.count())
}

fn saturating_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}
