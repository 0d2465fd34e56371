use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Conversion error: {value} does not fit into {target}")]
    Overflow { value: U256, target: &'static str },
}

pub fn uint256_to_u128(value: U256) -> Result<u128, ConversionError> {
    u128::try_from(value).map_err(|_| ConversionError::Overflow { value, target: "u128" })
}

pub fn uint256_to_u64(value: U256) -> Result<u64, ConversionError> {
    u64::try_from(value).map_err(|_| ConversionError::Overflow { value, target: "u64" })
}

/// Rounds to a fixed number of decimal places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
