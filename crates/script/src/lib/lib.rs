pub mod beacon_api;
pub mod cache;
pub mod consts;
pub mod env;
pub mod eth_client;
pub mod ipfs_logs;
pub mod lido_api;
pub mod operator_service;
pub mod prometheus_metrics;
pub mod rewards_tree;
pub mod scripts;
pub mod tracing;
pub mod utils;
