use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use csm_dashboard_shared::io::rewards_tree::RewardsTree;
use reqwest::Client;

use super::RewardsTreeReader;
use crate::prometheus_metrics::{self, services::rewards_tree::READ_TREE};
use crate::utils;

pub struct ReqwestRewardsTreeReader {
    url: String,
    client: Client,
    metric_reporter: Arc<prometheus_metrics::Service>,
}

impl ReqwestRewardsTreeReader {
    pub fn new(url: &str, timeout: Duration, metric_reporter: Arc<prometheus_metrics::Service>) -> anyhow::Result<Self> {
        Ok(Self {
            url: url.trim().to_owned(),
            client: utils::http_client(timeout).context("Failed to create http client")?,
            metric_reporter,
        })
    }

    async fn read_tree_impl(&self) -> anyhow::Result<RewardsTree> {
        tracing::info!("Fetching rewards tree from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to request rewards tree {}", self.url))?
            .error_for_status()
            .context("Rewards tree request failed")?;
        let body = response.bytes().await.context("Failed to read rewards tree body")?;
        tracing::debug!("Received rewards tree, {} bytes", body.len());

        let tree = RewardsTree::from_slice(&body).context("Failed to parse rewards tree")?;
        tracing::info!(operators = tree.len(), "Loaded rewards tree with {} operators", tree.len());
        Ok(tree)
    }
}

impl RewardsTreeReader for ReqwestRewardsTreeReader {
    async fn read_tree(&self) -> anyhow::Result<Arc<RewardsTree>> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(READ_TREE, || self.read_tree_impl())
            .await
            .map(Arc::new)
    }
}
