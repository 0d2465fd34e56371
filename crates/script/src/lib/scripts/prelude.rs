use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use alloy::transports::http::reqwest::Url;
use anyhow::Context;
use csm_dashboard_shared::csm::OperatorRewards;
use csm_dashboard_shared::io::api::OperatorIdentifier;

use crate::beacon_api::BeaconApiClient;
use crate::consts::{self, defaults};
use crate::env::{self, EnvVarValue};
use crate::eth_client::{
    CSAccountingContractWrapper, CSFeeDistributorContractWrapper, CSModuleContractWrapper, CacheSettings,
    ProviderFactory, StETHContractWrapper,
};
use crate::ipfs_logs::IpfsLogClient;
use crate::lido_api::LidoApiClient;
use crate::operator_service::{self, LookupOptions, LookupSettings, OperatorService};
use crate::prometheus_metrics::{outcome, Metrics};
use crate::rewards_tree::{
    CachedRewardsTreeReader, FileRewardsTreeReader, ReqwestRewardsTreeReader, RewardsTreeSource,
};
use crate::tracing::LogFormat;

pub mod callers {
    pub const CLI: &str = "cli";
    pub const HTTP: &str = "http";
}

#[derive(Debug, Clone)]
pub struct EnvVars {
    pub log_format: EnvVarValue<LogFormat>,
    pub prometheus_namespace: EnvVarValue<String>,

    pub eth_rpc_url: EnvVarValue<Url>,
    pub beacon_api_url: EnvVarValue<String>,
    pub beacon_api_key: EnvVarValue<Option<String>>,
    pub rewards_proofs_url: EnvVarValue<String>,
    pub rewards_tree_file: EnvVarValue<Option<PathBuf>>,
    pub lido_api_url: EnvVarValue<String>,
    pub ipfs_gateway_url: EnvVarValue<String>,

    pub cache_ttl_seconds: EnvVarValue<u64>,
    pub rewards_tree_ttl_seconds: EnvVarValue<u64>,
    pub cache_max_entries: EnvVarValue<usize>,

    pub csmodule_address: EnvVarValue<Address>,
    pub csaccounting_address: EnvVarValue<Address>,
    pub csfeedistributor_address: EnvVarValue<Address>,
    pub steth_address: EnvVarValue<Address>,

    pub operator_lookup_concurrency: EnvVarValue<usize>,
    pub distribution_log_from_block: EnvVarValue<u64>,
    pub distribution_log_block_range: EnvVarValue<u64>,
}

impl EnvVars {
    pub fn init_from_env() -> Result<Self, env::Error> {
        let contracts = consts::contracts::MAINNET;
        Ok(Self {
            log_format: env::LOG_FORMAT.default(LogFormat::Plain)?,
            prometheus_namespace: env::PROMETHEUS_NAMESPACE.default(defaults::PROMETHEUS_NAMESPACE.to_owned())?,

            eth_rpc_url: env::ETH_RPC_URL.default_str(defaults::ETH_RPC_URL)?,
            beacon_api_url: env::BEACON_API_URL.default(defaults::BEACON_API_URL.to_owned())?,
            beacon_api_key: env::BEACON_API_KEY.optional()?,
            rewards_proofs_url: env::REWARDS_PROOFS_URL.default(defaults::REWARDS_PROOFS_URL.to_owned())?,
            rewards_tree_file: env::REWARDS_TREE_FILE.optional()?,
            lido_api_url: env::LIDO_API_URL.default(defaults::LIDO_API_URL.to_owned())?,
            ipfs_gateway_url: env::IPFS_GATEWAY_URL.default(defaults::IPFS_GATEWAY_URL.to_owned())?,

            cache_ttl_seconds: env::CACHE_TTL_SECONDS.default(defaults::CACHE_TTL_SECONDS)?,
            rewards_tree_ttl_seconds: env::REWARDS_TREE_TTL_SECONDS.default(defaults::REWARDS_TREE_TTL_SECONDS)?,
            cache_max_entries: env::CACHE_MAX_ENTRIES.default(defaults::CACHE_MAX_ENTRIES)?,

            csmodule_address: env::CSMODULE_ADDRESS.default(contracts.csmodule)?,
            csaccounting_address: env::CSACCOUNTING_ADDRESS.default(contracts.csaccounting)?,
            csfeedistributor_address: env::CSFEEDISTRIBUTOR_ADDRESS.default(contracts.csfeedistributor)?,
            steth_address: env::STETH_ADDRESS.default(contracts.steth)?,

            operator_lookup_concurrency: env::OPERATOR_LOOKUP_CONCURRENCY
                .default(defaults::OPERATOR_LOOKUP_CONCURRENCY)?,
            distribution_log_from_block: env::DISTRIBUTION_LOG_FROM_BLOCK
                .default(consts::contracts::MAINNET_DISTRIBUTION_LOG_FROM_BLOCK)?,
            distribution_log_block_range: env::DISTRIBUTION_LOG_BLOCK_RANGE
                .default(defaults::DISTRIBUTION_LOG_BLOCK_RANGE)?,
        })
    }

    pub fn with_rpc_url(mut self, url: Url) -> Self {
        self.eth_rpc_url = EnvVarValue::overridden(&env::ETH_RPC_URL, url);
        self
    }

    fn cache_settings(&self) -> CacheSettings {
        let records_ttl = Duration::from_secs(self.cache_ttl_seconds.value);
        CacheSettings {
            records_ttl,
            volatile_ttl: consts::VOLATILE_READ_TTL.min(records_ttl),
            max_entries: self.cache_max_entries.value,
        }
    }
}

pub struct ScriptRuntime {
    pub operator_service: OperatorService,
    pub metrics: Arc<Metrics>,
    pub env_vars: EnvVars,
}

impl ScriptRuntime {
    pub fn init(env_vars: EnvVars) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new(&env_vars.prometheus_namespace.value));
        let services = &metrics.services;
        let timeout = Duration::from_secs(defaults::HTTP_TIMEOUT_SECONDS);
        let cache_settings = env_vars.cache_settings();

        let provider = Arc::new(ProviderFactory::create_provider(env_vars.eth_rpc_url.value.clone()));

        let tree_source = match &env_vars.rewards_tree_file.value {
            Some(path) => RewardsTreeSource::File(FileRewardsTreeReader::new(path)),
            None => RewardsTreeSource::Remote(ReqwestRewardsTreeReader::new(
                &env_vars.rewards_proofs_url.value,
                timeout,
                Arc::clone(&services.rewards_tree),
            )?),
        };

        let operator_service = OperatorService {
            csmodule: CSModuleContractWrapper::new(
                Arc::clone(&provider),
                env_vars.csmodule_address.value,
                Arc::clone(&services.eth_client),
                cache_settings,
            ),
            accounting: CSAccountingContractWrapper::new(
                Arc::clone(&provider),
                env_vars.csaccounting_address.value,
                Arc::clone(&services.eth_client),
                cache_settings,
            ),
            fee_distributor: CSFeeDistributorContractWrapper::new(
                Arc::clone(&provider),
                env_vars.csfeedistributor_address.value,
                Arc::clone(&services.eth_client),
                cache_settings,
            ),
            steth: StETHContractWrapper::new(
                Arc::clone(&provider),
                env_vars.steth_address.value,
                Arc::clone(&services.eth_client),
                cache_settings,
            ),
            rewards_tree: CachedRewardsTreeReader::new(
                tree_source,
                Duration::from_secs(env_vars.rewards_tree_ttl_seconds.value),
            ),
            beacon_api: BeaconApiClient::new(
                &env_vars.beacon_api_url.value,
                env_vars.beacon_api_key.value.clone(),
                timeout,
                Arc::clone(&services.beacon_api),
            )?,
            lido_api: LidoApiClient::new(&env_vars.lido_api_url.value, timeout, Arc::clone(&services.lido_api))?,
            ipfs_logs: IpfsLogClient::new(
                &env_vars.ipfs_gateway_url.value,
                timeout,
                cache_settings.max_entries,
                Arc::clone(&services.ipfs),
            )?,
            settings: LookupSettings {
                lookup_concurrency: env_vars.operator_lookup_concurrency.value.max(1),
                distribution_log_from_block: env_vars.distribution_log_from_block.value,
                distribution_log_block_range: env_vars.distribution_log_block_range.value.max(1),
            },
        };

        Ok(Self {
            operator_service,
            metrics,
            env_vars,
        })
    }

    pub fn init_from_env() -> anyhow::Result<Self> {
        let env_vars = EnvVars::init_from_env().context("Failed to read configuration")?;
        Self::init(env_vars)
    }

    /// Resolves `identifier` and records the lookup under `caller`.
    pub async fn lookup(
        &self,
        caller: &str,
        identifier: &OperatorIdentifier,
        options: LookupOptions,
    ) -> Result<Option<OperatorRewards>, operator_service::Error> {
        let started = Instant::now();
        let result = self.operator_service.lookup(identifier, options).await;
        let lookup_outcome = match &result {
            Ok(Some(_)) => outcome::FOUND,
            Ok(None) => outcome::NOT_FOUND,
            Err(_) => outcome::ERROR,
        };
        self.metrics
            .lookups
            .observe(caller, lookup_outcome, started.elapsed().as_secs_f64());
        result
    }
}
