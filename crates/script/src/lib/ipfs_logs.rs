use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use csm_dashboard_shared::csm::{NodeOperatorId, ValidatorFramePerformance};
use csm_dashboard_shared::validators::FramePerformance;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::cache::TtlCache;
use crate::consts::{batching::IPFS_CONCURRENT_FETCHES, IPFS_LOG_TTL};
use crate::prometheus_metrics::{self, services::ipfs::FETCH_LOG};
use crate::utils;

#[derive(Deserialize)]
struct LogDto {
    frame: (u64, u64),
    #[serde(default)]
    operators: HashMap<String, OperatorLogDto>,
}

#[derive(Deserialize)]
struct OperatorLogDto {
    #[serde(default)]
    distributed: Option<u128>,
    #[serde(default)]
    distributed_rewards: Option<u128>,
    #[serde(default)]
    validators: HashMap<String, ValidatorLogDto>,
}

impl OperatorLogDto {
    fn shares(&self) -> u128 {
        self.distributed.or(self.distributed_rewards).unwrap_or(0)
    }
}

#[derive(Deserialize, Default)]
struct DutyDto {
    #[serde(default)]
    assigned: u64,
    #[serde(default)]
    included: u64,
}

#[derive(Deserialize)]
struct ValidatorLogDto {
    #[serde(default, alias = "attestation_duty")]
    perf: DutyDto,
    #[serde(default)]
    strikes: u32,
}

impl From<&ValidatorLogDto> for ValidatorFramePerformance {
    fn from(value: &ValidatorLogDto) -> Self {
        Self {
            assigned: value.perf.assigned,
            included: value.perf.included,
            strikes: value.strikes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorLog {
    pub distributed_shares: u128,
    pub validators: FramePerformance,
}

/// One published distribution: the frame it covers and what each operator received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionLog {
    pub start_epoch: u64,
    pub end_epoch: u64,
    pub operators: BTreeMap<NodeOperatorId, OperatorLog>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorFrame {
    pub start_epoch: u64,
    pub end_epoch: u64,
    pub distributed_shares: u128,
    pub validators: FramePerformance,
}

impl DistributionLog {
    /// Accepts a single log object or an array of them (one report covering several
    /// frames); arrays are merged into one span with summed shares.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: Box<RawValue> = serde_json::from_slice(bytes)?;
        let logs: Vec<LogDto> = if raw.get().trim_start().starts_with('[') {
            serde_json::from_str(raw.get())?
        } else {
            vec![serde_json::from_str(raw.get())?]
        };

        let mut merged = DistributionLog {
            start_epoch: u64::MAX,
            end_epoch: 0,
            operators: BTreeMap::new(),
        };
        for log in logs {
            merged.start_epoch = merged.start_epoch.min(log.frame.0);
            merged.end_epoch = merged.end_epoch.max(log.frame.1);
            for (key, operator) in log.operators {
                let Ok(id) = key.parse::<NodeOperatorId>() else {
                    tracing::debug!("Skipping unexpected operator key {key:?}");
                    continue;
                };
                let entry = merged.operators.entry(id).or_default();
                entry.distributed_shares = entry.distributed_shares.saturating_add(operator.shares());
                for (index, validator) in &operator.validators {
                    let Ok(index) = index.parse::<u64>() else {
                        tracing::debug!("Skipping unexpected validator key {index:?}");
                        continue;
                    };
                    entry
                        .validators
                        .entry(index)
                        .or_default()
                        .merge(&ValidatorFramePerformance::from(validator));
                }
            }
        }
        if merged.start_epoch > merged.end_epoch {
            merged.start_epoch = merged.end_epoch;
        }
        Ok(merged)
    }

    pub fn frame_for(&self, operator_id: NodeOperatorId) -> Option<OperatorFrame> {
        self.operators.get(&operator_id).map(|operator| OperatorFrame {
            start_epoch: self.start_epoch,
            end_epoch: self.end_epoch,
            distributed_shares: operator.distributed_shares,
            validators: operator.validators.clone(),
        })
    }
}

pub struct IpfsLogClient {
    gateway_url: String,
    client: Client,
    metric_reporter: Arc<prometheus_metrics::Service>,
    logs: TtlCache<String, Arc<DistributionLog>>,
}

impl IpfsLogClient {
    pub fn new(
        gateway_url: &str,
        timeout: Duration,
        max_cached_logs: usize,
        metric_reporter: Arc<prometheus_metrics::Service>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            gateway_url: utils::normalize_url(gateway_url),
            client: utils::http_client(timeout).context("Failed to create http client")?,
            metric_reporter,
            logs: TtlCache::new(IPFS_LOG_TTL, max_cached_logs),
        })
    }

    async fn fetch_log_impl(&self, cid: &str) -> anyhow::Result<Arc<DistributionLog>> {
        let url = format!("{}/ipfs/{}", self.gateway_url, cid);
        tracing::debug!("Fetching distribution log {cid}");
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("Distribution log {cid} request failed"))?
            .bytes()
            .await?;
        let log = DistributionLog::from_slice(&body).with_context(|| format!("Malformed distribution log {cid}"))?;
        Ok(Arc::new(log))
    }

    pub fn cleanup_expired(&self) -> usize {
        self.logs.cleanup_expired()
    }

    pub async fn fetch_log(&self, cid: &str) -> anyhow::Result<Arc<DistributionLog>> {
        self.logs
            .get_or_try_insert_with(cid.to_owned(), IPFS_LOG_TTL, || {
                self.metric_reporter
                    .run_with_metrics_and_logs_async(FETCH_LOG, || self.fetch_log_impl(cid))
            })
            .await
    }

    /// The operator's frames in `cids` order. Logs that fail to load are skipped, as are
    /// logs the operator does not appear in.
    pub async fn get_operator_history(&self, operator_id: NodeOperatorId, cids: &[String]) -> Vec<OperatorFrame> {
        let results: Vec<_> = stream::iter(cids.iter().cloned())
            .map(|cid| async move {
                let result = self.fetch_log(&cid).await;
                (cid, result)
            })
            .buffered(IPFS_CONCURRENT_FETCHES)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(cid, result)| match result {
                Ok(log) => log.frame_for(operator_id),
                Err(e) => {
                    tracing::warn!("Skipping distribution log {cid}: {e:?}");
                    None
                }
            })
            .collect()
    }
}
