use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use csm_dashboard_shared::csm::{BlsPubkey, ValidatorInfo, ValidatorStatus, BLS_PUBKEY_LENGTH};
use reqwest::Client;
use serde::Deserialize;

use crate::consts::batching::BEACON_API_PUBKEYS_PER_REQUEST;
use crate::prometheus_metrics::{self, services::beacon_api::GET_VALIDATORS};
use crate::utils;

// The explorer reports "not yet"/"never" epochs as i64::MAX
const UNSET_EPOCH_THRESHOLD: u64 = i64::MAX as u64;

#[derive(Deserialize)]
struct ValidatorsResponse {
    status: String,
    #[serde(default)]
    data: Option<ValidatorsData>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ValidatorsData {
    Many(Vec<ValidatorDto>),
    One(Box<ValidatorDto>),
}

impl ValidatorsData {
    fn into_vec(self) -> Vec<ValidatorDto> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![*item],
        }
    }
}

#[derive(Deserialize, Debug)]
struct ValidatorDto {
    pubkey: String,
    #[serde(default)]
    validatorindex: Option<u64>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    balance: u64,
    #[serde(default)]
    effectivebalance: u64,
    #[serde(default)]
    slashed: bool,
    #[serde(default)]
    activationepoch: Option<u64>,
    #[serde(default)]
    exitepoch: Option<u64>,
}

fn parse_pubkey(value: &str) -> anyhow::Result<BlsPubkey> {
    let mut pubkey = [0u8; BLS_PUBKEY_LENGTH];
    hex::decode_to_slice(value.strip_prefix("0x").unwrap_or(value), &mut pubkey)
        .map_err(|e| anyhow!("Invalid validator pubkey {value}: {e:?}"))?;
    Ok(pubkey)
}

fn known_epoch(epoch: Option<u64>) -> Option<u64> {
    epoch.filter(|value| *value < UNSET_EPOCH_THRESHOLD)
}

impl TryFrom<ValidatorDto> for ValidatorInfo {
    type Error = anyhow::Error;

    fn try_from(value: ValidatorDto) -> Result<Self, Self::Error> {
        Ok(ValidatorInfo {
            pubkey: parse_pubkey(&value.pubkey)?,
            index: value.validatorindex,
            status: ValidatorStatus::from(value.status),
            balance_gwei: value.balance,
            effective_balance_gwei: value.effectivebalance,
            slashed: value.slashed,
            activation_epoch: known_epoch(value.activationepoch),
            exit_epoch: known_epoch(value.exitepoch),
        })
    }
}

/// Client for a beaconcha.in-compatible explorer API.
pub struct BeaconApiClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
    metric_reporter: Arc<prometheus_metrics::Service>,
}

impl BeaconApiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        metric_reporter: Arc<prometheus_metrics::Service>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: utils::normalize_url(base_url),
            api_key,
            client: utils::http_client(timeout).context("Failed to create http client")?,
            metric_reporter,
        })
    }

    async fn get_validators_batch(&self, pubkeys: &[BlsPubkey]) -> anyhow::Result<Vec<ValidatorDto>> {
        let ids = pubkeys
            .iter()
            .map(|pubkey| format!("0x{}", hex::encode(pubkey)))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/validator/{}", self.base_url, ids);
        tracing::debug!("Requesting {} validators", pubkeys.len());

        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("apikey", api_key)]);
        }
        let response: ValidatorsResponse = request
            .send()
            .await
            .context("Failed to request validators")?
            .error_for_status()
            .context("Validators request failed")?
            .json()
            .await
            .context("Failed to parse validators response")?;

        if response.status != "OK" {
            return Err(anyhow!("Beacon API returned status {:?}", response.status));
        }
        Ok(response.data.map(ValidatorsData::into_vec).unwrap_or_default())
    }

    /// Looks up validators in batches. The result follows `pubkeys` order; keys the explorer
    /// does not know yet come back with [`ValidatorStatus::Unknown`].
    pub async fn get_validators_by_pubkeys(&self, pubkeys: &[BlsPubkey]) -> anyhow::Result<Vec<ValidatorInfo>> {
        let mut result = Vec::with_capacity(pubkeys.len());
        for batch in pubkeys.chunks(BEACON_API_PUBKEYS_PER_REQUEST) {
            let dtos = self
                .metric_reporter
                .run_with_metrics_and_logs_async(GET_VALIDATORS, || self.get_validators_batch(batch))
                .await?;

            let mut by_pubkey = HashMap::with_capacity(dtos.len());
            for dto in dtos {
                let info = ValidatorInfo::try_from(dto)?;
                by_pubkey.insert(info.pubkey, info);
            }
            result.extend(
                batch
                    .iter()
                    .map(|pubkey| by_pubkey.remove(pubkey).unwrap_or_else(|| ValidatorInfo::unknown(*pubkey))),
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_list_payloads() {
        let pubkey = format!("0x{}", "ab".repeat(48));
        let single = format!(
            r#"{{"status":"OK","data":{{"pubkey":"{pubkey}","validatorindex":7,"status":"active_online",
            "balance":32001000000,"effectivebalance":32000000000,"slashed":false,
            "activationepoch":1000,"exitepoch":9223372036854775807}}}}"#
        );
        let parsed: ValidatorsResponse = serde_json::from_str(&single).unwrap();
        let items = parsed.data.unwrap().into_vec();
        assert_eq!(items.len(), 1);

        let info = ValidatorInfo::try_from(items.into_iter().next().unwrap()).unwrap();
        assert_eq!(info.pubkey, [0xab; 48]);
        assert_eq!(info.index, Some(7));
        assert_eq!(info.status, ValidatorStatus::ActiveOnline);
        assert_eq!(info.activation_epoch, Some(1000));
        assert_eq!(info.exit_epoch, None);

        let list = format!(r#"{{"status":"OK","data":[{{"pubkey":"{pubkey}","status":"exited"}}]}}"#);
        let parsed: ValidatorsResponse = serde_json::from_str(&list).unwrap();
        assert_eq!(parsed.data.unwrap().into_vec()[0].status, "exited");
    }

    #[test]
    fn rejects_bad_pubkey() {
        assert!(parse_pubkey("0x1234").is_err());
        assert!(parse_pubkey(&"zz".repeat(48)).is_err());
    }
}
