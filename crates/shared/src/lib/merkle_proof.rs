//! Inclusion checks for the rewards tree.
//!
//! The tree is an OpenZeppelin `StandardMerkleTree` over `(uint256 nodeOperatorId, uint256 shares)`
//! leaves: each leaf is double-hashed and inner nodes hash the sorted pair of children.

use alloy_primitives::{keccak256, B256, U256};
use alloy_sol_types::SolValue;

use crate::csm::NodeOperatorId;

pub fn leaf_hash(operator_id: NodeOperatorId, cumulative_shares: u128) -> B256 {
    let encoded = (U256::from(operator_id.0), U256::from(cumulative_shares)).abi_encode_params();
    keccak256(keccak256(encoded))
}

pub fn hash_pair(left: &B256, right: &B256) -> B256 {
    let (first, second) = if left <= right { (left, right) } else { (right, left) };
    let mut buffer = [0u8; 64];
    buffer[..32].copy_from_slice(first.as_slice());
    buffer[32..].copy_from_slice(second.as_slice());
    keccak256(buffer)
}

pub fn process_proof(leaf: B256, proof: &[B256]) -> B256 {
    proof.iter().fold(leaf, |acc, sibling| hash_pair(&acc, sibling))
}

pub fn verify(root: &B256, operator_id: NodeOperatorId, cumulative_shares: u128, proof: &[B256]) -> bool {
    process_proof(leaf_hash(operator_id, cumulative_shares), proof) == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    fn manual_leaf(id: u64, shares: u128) -> B256 {
        let mut encoded = Vec::with_capacity(64);
        encoded.extend_from_slice(&U256::from(id).to_be_bytes::<32>());
        encoded.extend_from_slice(&U256::from(shares).to_be_bytes::<32>());
        keccak256(keccak256(encoded))
    }

    #[test]
    fn leaf_matches_abi_encoding() {
        assert_eq!(leaf_hash(NodeOperatorId(3), 1_234_567), manual_leaf(3, 1_234_567));
        assert_ne!(leaf_hash(NodeOperatorId(3), 1_234_567), leaf_hash(NodeOperatorId(4), 1_234_567));
    }

    #[test]
    fn standard_merkle_tree_values() {
        // StandardMerkleTree.of([[0, 1e18], [1, 2e18]], ["uint256", "uint256"])
        let first = leaf_hash(NodeOperatorId(0), 1_000_000_000_000_000_000);
        let second = leaf_hash(NodeOperatorId(1), 2_000_000_000_000_000_000);
        assert_eq!(
            first,
            b256!("cc4b1419f3b34fe47faec8d8935441a5580fe7b72aa55c5cf51d903df9dab814")
        );
        assert_eq!(
            second,
            b256!("ea6c414916cf44a7887e492f5a93cd7cbf8fa0ff0a2574fe4cb795cf654b3989")
        );

        let root = b256!("29f45cf50e486bea9d6118f8eb95eb15ed11baeddf748e20f234de28dc0426ed");
        assert_eq!(hash_pair(&first, &second), root);
        assert!(verify(&root, NodeOperatorId(1), 2_000_000_000_000_000_000, &[first]));
    }

    #[test]
    fn pair_hashing_is_commutative() {
        let a = leaf_hash(NodeOperatorId(0), 10);
        let b = leaf_hash(NodeOperatorId(1), 20);
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn verifies_four_leaf_tree() {
        let leaves: Vec<B256> = (0..4u64)
            .map(|id| leaf_hash(NodeOperatorId(id), u128::from(id) * 1_000_000_000_000_000_000))
            .collect();
        let left = hash_pair(&leaves[0], &leaves[1]);
        let right = hash_pair(&leaves[2], &leaves[3]);
        let root = hash_pair(&left, &right);

        let proof = vec![leaves[3], left];
        assert!(verify(&root, NodeOperatorId(2), 2_000_000_000_000_000_000, &proof));
        // wrong amount
        assert!(!verify(&root, NodeOperatorId(2), 2_000_000_000_000_000_001, &proof));
        // wrong id
        assert!(!verify(&root, NodeOperatorId(3), 2_000_000_000_000_000_000, &proof));
    }

    #[test]
    fn single_leaf_tree() {
        let leaf = leaf_hash(NodeOperatorId(0), 5);
        assert!(verify(&leaf, NodeOperatorId(0), 5, &[]));
    }
}
