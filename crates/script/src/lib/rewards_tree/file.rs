use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use csm_dashboard_shared::io::rewards_tree::RewardsTree;

use super::RewardsTreeReader;
use crate::utils::read_binary;

/// Reads a `proofs.json` snapshot from disk, e.g. a pinned copy for offline use.
pub struct FileRewardsTreeReader {
    path: PathBuf,
}

impl FileRewardsTreeReader {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}

impl RewardsTreeReader for FileRewardsTreeReader {
    async fn read_tree(&self) -> anyhow::Result<Arc<RewardsTree>> {
        tracing::info!("Reading rewards tree from {:?}", self.path);
        let content = read_binary(&self.path).with_context(|| format!("Failed to read {:?}", self.path))?;
        let tree = RewardsTree::from_slice(&content).with_context(|| format!("Failed to parse {:?}", self.path))?;
        Ok(Arc::new(tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csm_dashboard_shared::csm::NodeOperatorId;

    #[tokio::test]
    async fn reads_tree_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proofs.json");
        std::fs::write(
            &path,
            r#"{"CSM Operator 3": {"cumulativeFeeShares": 1500, "proof": []}, "metadata": {}}"#,
        )
        .unwrap();

        let tree = FileRewardsTreeReader::new(&path).read_tree().await.unwrap();
        assert_eq!(tree.operator_ids(), vec![NodeOperatorId(3)]);
        assert_eq!(tree.get(NodeOperatorId(3)).unwrap().cumulative_fee_shares, 1500);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let reader = FileRewardsTreeReader::new(Path::new("/nonexistent/proofs.json"));
        assert!(reader.read_tree().await.is_err());
    }
}
