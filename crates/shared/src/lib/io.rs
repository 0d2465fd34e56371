pub mod api;
pub mod rewards_tree;
pub mod serde_utils;
