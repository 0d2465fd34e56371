use std::collections::{BTreeMap, HashMap};

use alloy_primitives::B256;
use serde::Deserialize;
use serde_json::value::RawValue;
use thiserror::Error;

use crate::csm::{NodeOperatorId, RewardsInfo};

pub const OPERATOR_KEY_PREFIX: &str = "CSM Operator ";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed rewards tree: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed rewards tree entry {key:?}: {error}")]
    Entry { key: String, error: serde_json::Error },
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "cumulativeFeeShares")]
    cumulative_fee_shares: u128,
    #[serde(default)]
    proof: Vec<B256>,
}

/// Parsed `proofs.json`: cumulative fee shares and inclusion proof per operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardsTree {
    entries: BTreeMap<NodeOperatorId, RewardsInfo>,
}

pub fn parse_operator_key(key: &str) -> Option<NodeOperatorId> {
    key.strip_prefix(OPERATOR_KEY_PREFIX)?.parse().ok()
}

impl RewardsTree {
    /// Keys that don't name an operator are skipped; a malformed operator entry is an error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        // Values are kept raw: going through serde_json::Value would round share amounts
        // above u64::MAX through f64.
        let raw: HashMap<String, Box<RawValue>> = serde_json::from_slice(bytes)?;
        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            let Some(operator_id) = parse_operator_key(&key) else {
                continue;
            };
            let entry: RawEntry =
                serde_json::from_str(value.get()).map_err(|error| Error::Entry { key: key.clone(), error })?;
            entries.insert(
                operator_id,
                RewardsInfo {
                    cumulative_fee_shares: entry.cumulative_fee_shares,
                    proof: entry.proof,
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn get(&self, operator_id: NodeOperatorId) -> Option<&RewardsInfo> {
        self.entries.get(&operator_id)
    }

    /// Operator ids present in the tree, ascending.
    pub fn operator_ids(&self) -> Vec<NodeOperatorId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(NodeOperatorId, RewardsInfo)> for RewardsTree {
    fn from_iter<T: IntoIterator<Item = (NodeOperatorId, RewardsInfo)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    const TREE: &str = r#"{
        "CSM Operator 10": {
            "cumulativeFeeShares": 304687403773285400,
            "proof": [
                "0x1f2b5f8f3ac7b0e1a1c35c1c5cb2b76a3f8bdc0f8b0e1f5b2d2a7e9b1c1d2e3f",
                "0x0000000000000000000000000000000000000000000000000000000000000001"
            ]
        },
        "CSM Operator 2": {
            "cumulativeFeeShares": 98765432109876543210123,
            "proof": []
        },
        "CSM Operator abc": {"cumulativeFeeShares": 1, "proof": []},
        "metadata": {"whatever": true}
    }"#;

    #[test]
    fn parses_operator_entries() {
        let tree = RewardsTree::from_slice(TREE.as_bytes()).expect("tree should parse");

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.operator_ids(), vec![NodeOperatorId(2), NodeOperatorId(10)]);

        let entry = tree.get(NodeOperatorId(10)).expect("operator 10 should be present");
        assert_eq!(entry.cumulative_fee_shares, 304687403773285400);
        assert_eq!(
            entry.proof,
            vec![
                b256!("1f2b5f8f3ac7b0e1a1c35c1c5cb2b76a3f8bdc0f8b0e1f5b2d2a7e9b1c1d2e3f"),
                b256!("0000000000000000000000000000000000000000000000000000000000000001"),
            ]
        );

        // beyond u64 range, must not be rounded
        let big = tree.get(NodeOperatorId(2)).expect("operator 2 should be present");
        assert_eq!(big.cumulative_fee_shares, 98765432109876543210123);

        assert_eq!(tree.get(NodeOperatorId(3)), None);
    }

    #[test]
    fn operator_keys() {
        assert_eq!(parse_operator_key("CSM Operator 0"), Some(NodeOperatorId(0)));
        assert_eq!(parse_operator_key("CSM Operator -1"), None);
        assert_eq!(parse_operator_key("CSM Operator"), None);
        assert_eq!(parse_operator_key("Operator 1"), None);
    }

    #[test]
    fn empty_tree() {
        let tree = RewardsTree::from_slice(b"{}").expect("empty object is a valid tree");
        assert!(tree.is_empty());
        assert!(tree.operator_ids().is_empty());
    }

    #[test]
    fn malformed_tree() {
        assert!(matches!(RewardsTree::from_slice(b"[1, 2]"), Err(Error::Json(_))));
        assert!(matches!(
            RewardsTree::from_slice(br#"{"CSM Operator 1": {"proof": []}}"#),
            Err(Error::Entry { .. })
        ));
    }
}
