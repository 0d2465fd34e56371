use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;

use crate::prometheus_metrics::{self, services::lido_api::GET_STETH_APR};
use crate::utils;

#[derive(Deserialize)]
struct AprResponse {
    data: AprData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AprData {
    sma_apr: f64,
}

pub struct LidoApiClient {
    base_url: String,
    client: Client,
    metric_reporter: Arc<prometheus_metrics::Service>,
}

impl LidoApiClient {
    pub fn new(base_url: &str, timeout: Duration, metric_reporter: Arc<prometheus_metrics::Service>) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: utils::normalize_url(base_url),
            client: utils::http_client(timeout).context("Failed to create http client")?,
            metric_reporter,
        })
    }

    async fn get_steth_apr_impl(&self) -> anyhow::Result<f64> {
        let url = format!("{}/v1/protocol/steth/apr/sma", self.base_url);
        let response: AprResponse = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to request {url}"))?
            .error_for_status()
            .context("stETH APR request failed")?
            .json()
            .await
            .context("Failed to parse stETH APR response")?;
        Ok(response.data.sma_apr)
    }

    /// 7-day moving average stETH APR, in percent.
    pub async fn get_steth_apr(&self) -> anyhow::Result<f64> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(GET_STETH_APR, || self.get_steth_apr_impl())
            .await
    }
}
