use chrono::{DateTime, Utc};
pub use typenum::*;

pub type SlotsPerEpoch = U32;
pub type SecondsPerSlot = U12;

/// Mainnet beacon chain genesis, unix seconds.
pub const MAINNET_GENESIS_TIMESTAMP: u64 = 1606824023;

/// Length of a CSM reward distribution frame (roughly 28 days).
pub const CSM_FRAME_EPOCHS: u64 = 6300;

pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;

pub const GWEI_PER_ETH: u64 = 1_000_000_000;

pub fn seconds_per_epoch() -> u64 {
    SlotsPerEpoch::to_u64() * SecondsPerSlot::to_u64()
}

pub fn epoch_to_timestamp(epoch: u64) -> u64 {
    MAINNET_GENESIS_TIMESTAMP.saturating_add(epoch.saturating_mul(seconds_per_epoch()))
}

/// `None` for epochs that can't be represented as a date (e.g. far future epoch).
pub fn epoch_to_datetime(epoch: u64) -> Option<DateTime<Utc>> {
    if epoch == FAR_FUTURE_EPOCH {
        return None;
    }
    timestamp_to_datetime(epoch_to_timestamp(epoch))
}

pub fn timestamp_to_datetime(timestamp: u64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp.try_into().ok()?, 0)
}
