use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use prometheus::{
    GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
};

pub mod services {
    pub mod eth_client {
        pub const GET_NODE_OPERATORS_COUNT: &str = "get_node_operators_count";
        pub const GET_NODE_OPERATOR: &str = "get_node_operator";
        pub const GET_SIGNING_KEYS: &str = "get_signing_keys";
        pub const GET_BOND_SUMMARY: &str = "get_bond_summary";
        pub const GET_DISTRIBUTED_SHARES: &str = "get_distributed_shares";
        pub const GET_TREE_ROOT: &str = "get_tree_root";
        pub const GET_POOLED_ETH_BY_SHARES: &str = "get_pooled_eth_by_shares";
        pub const GET_DISTRIBUTION_LOG_CIDS: &str = "get_distribution_log_cids";
        pub const GET_SHARES_TRANSFERS: &str = "get_shares_transfers";
    }
    pub mod rewards_tree {
        pub const READ_TREE: &str = "read_tree";
    }
    pub mod beacon_api {
        pub const GET_VALIDATORS: &str = "get_validators";
    }
    pub mod lido_api {
        pub const GET_STETH_APR: &str = "get_steth_apr";
    }
    pub mod ipfs {
        pub const FETCH_LOG: &str = "fetch_log";
    }
}

pub mod outcome {
    pub const FOUND: &str = "found";
    pub const NOT_FOUND: &str = "not_found";
    pub const ERROR: &str = "error";
}

pub trait Registar {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()>;
}

pub struct Metrics {
    pub metadata: Metadata,
    pub lookups: Lookups,
    pub services: Services,
}

impl Registar for Metrics {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        self.metadata.register_on(registry)?;
        self.lookups.register_on(registry)?;
        self.services.register_on(registry)?;
        Ok(())
    }
}

pub struct Metadata {
    pub app_build_info: GaugeVec,
}

impl Registar for Metadata {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        registry.register(Box::new(self.app_build_info.clone()))?;
        Ok(())
    }
}

pub struct Lookups {
    pub requests: IntCounterVec,
    pub execution_time_seconds: Histogram,
}

impl Lookups {
    pub fn observe(&self, caller: &str, outcome: &str, elapsed_seconds: f64) {
        self.requests.with_label_values(&[caller, outcome]).inc();
        self.execution_time_seconds.observe(elapsed_seconds);
    }
}

impl Registar for Lookups {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        registry.register(Box::new(self.requests.clone()))?;
        registry.register(Box::new(self.execution_time_seconds.clone()))?;
        Ok(())
    }
}

pub struct Service {
    pub call_count: IntCounterVec,
    pub error_count: IntCounterVec,
    pub execution_time_seconds: HistogramVec,
}

impl Registar for Service {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        registry.register(Box::new(self.call_count.clone()))?;
        registry.register(Box::new(self.error_count.clone()))?;
        registry.register(Box::new(self.execution_time_seconds.clone()))?;
        Ok(())
    }
}

impl Service {
    /// Runs one external call, recording count, latency and failures under `operation`.
    pub async fn run_with_metrics_and_logs_async<T, E, F, Fut>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.call_count.with_label_values(&[operation]).inc();
        let timer = self.execution_time_seconds.with_label_values(&[operation]).start_timer();
        tracing::debug!(operation = operation, "Calling {operation}");

        let result = f().await;
        let elapsed = timer.stop_and_record();

        match &result {
            Ok(_) => tracing::debug!(operation = operation, elapsed, "{operation} succeeded"),
            Err(e) => {
                self.error_count.with_label_values(&[operation]).inc();
                tracing::warn!(operation = operation, elapsed, "{operation} failed: {e:?}");
            }
        }
        result
    }
}

pub struct Services {
    pub eth_client: Arc<Service>,
    pub rewards_tree: Arc<Service>,
    pub beacon_api: Arc<Service>,
    pub lido_api: Arc<Service>,
    pub ipfs: Arc<Service>,
}

impl Registar for Services {
    fn register_on(&self, registry: &Registry) -> anyhow::Result<()> {
        self.eth_client.register_on(registry)?;
        self.rewards_tree.register_on(registry)?;
        self.beacon_api.register_on(registry)?;
        self.lido_api.register_on(registry)?;
        self.ipfs.register_on(registry)?;
        Ok(())
    }
}

pub fn register_int_counter_vec(namespace: &str, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    IntCounterVec::new(opts, labels).unwrap()
}

pub fn register_gauge_vec(namespace: &str, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let opts = Opts::new(name, help).namespace(namespace.to_string());
    GaugeVec::new(opts, labels).unwrap()
}

pub fn register_histogram(namespace: &str, name: &str, help: &str) -> Histogram {
    let opts = HistogramOpts::new(name, help).namespace(namespace.to_string());
    Histogram::with_opts(opts).unwrap()
}

pub fn register_histogram_vec(namespace: &str, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let opts = HistogramOpts::new(name, help).namespace(namespace.to_string());
    HistogramVec::new(opts, labels).unwrap()
}

impl Metrics {
    pub fn new(namespace: &str) -> Self {
        let metadata = Metadata {
            app_build_info: register_gauge_vec(
                namespace,
                "metadata__app_build_info",
                "Application Build Info",
                &["version"],
            ),
        };
        metadata
            .app_build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1.0);

        let lookups = Lookups {
            requests: register_int_counter_vec(
                namespace,
                "lookups__requests",
                "Operator lookups by caller and outcome",
                &["caller", "outcome"],
            ),
            execution_time_seconds: register_histogram(
                namespace,
                "lookups__execution_time_seconds",
                "Operator lookup execution time in seconds",
            ),
        };

        fn build_service_metrics(namespace: &str, component: &str) -> Arc<Service> {
            Arc::new(Service {
                call_count: register_int_counter_vec(
                    namespace,
                    &format!("external__{component}__call_count"),
                    "Total call count",
                    &["operation"],
                ),
                error_count: register_int_counter_vec(
                    namespace,
                    &format!("external__{component}__error_count"),
                    "Failed call count",
                    &["operation"],
                ),
                execution_time_seconds: register_histogram_vec(
                    namespace,
                    &format!("external__{component}__execution_time_seconds"),
                    "Execution time in seconds",
                    &["operation"],
                ),
            })
        }

        let services = Services {
            eth_client: build_service_metrics(namespace, "eth_client"),
            rewards_tree: build_service_metrics(namespace, "rewards_tree"),
            beacon_api: build_service_metrics(namespace, "beacon_api"),
            lido_api: build_service_metrics(namespace, "lido_api"),
            ipfs: build_service_metrics(namespace, "ipfs"),
        };

        Metrics {
            metadata,
            lookups,
            services,
        }
    }
}
