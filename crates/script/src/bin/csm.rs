use std::process::ExitCode;
use std::time::Duration;

use alloy::transports::http::reqwest::Url;
use clap::{Args, Parser, Subcommand};
use csm_dashboard_scripts::consts::defaults;
use csm_dashboard_scripts::operator_service::LookupOptions;
use csm_dashboard_scripts::scripts::{self, check, prelude::EnvVars, prelude::ScriptRuntime};
use csm_dashboard_scripts::tracing as tracing_config;
use csm_dashboard_shared::csm::NodeOperatorId;
use csm_dashboard_shared::io::api::OperatorIdentifier;

// cargo run --bin csm -- check 0xYourAddress --detailed
// cargo run --bin csm -- check --id 42 --json --withdrawals

#[derive(Parser, Debug)]
#[clap(author, version, about = "Lido CSM operator rewards dashboard", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct RpcArgs {
    /// Execution-layer RPC endpoint, overrides ETH_RPC_URL
    #[clap(long)]
    rpc: Option<Url>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show bond and rewards of an operator
    Check {
        /// Manager or reward address of the operator
        #[clap(required_unless_present = "id", conflicts_with = "id")]
        address: Option<String>,
        /// Operator id, instead of an address
        #[clap(long)]
        id: Option<u64>,
        #[clap(flatten)]
        rpc: RpcArgs,
        #[clap(long, default_value = "false")]
        json: bool,
        /// Include validators, health and APY
        #[clap(long, default_value = "false")]
        detailed: bool,
        /// Include per-frame distribution history (implies --detailed)
        #[clap(long, default_value = "false")]
        history: bool,
        /// Include rewards claims paid to the reward address
        #[clap(long, default_value = "false")]
        withdrawals: bool,
    },
    /// Refresh `check` output periodically
    Watch {
        address: String,
        #[clap(long, default_value_t = defaults::WATCH_INTERVAL_SECONDS)]
        interval: u64,
        #[clap(flatten)]
        rpc: RpcArgs,
    },
    /// List operators present in the rewards tree
    List {
        #[clap(flatten)]
        rpc: RpcArgs,
        #[clap(long, default_value = "false")]
        json: bool,
    },
}

impl Command {
    fn rpc(&self) -> Option<&Url> {
        match self {
            Self::Check { rpc, .. } | Self::Watch { rpc, .. } | Self::List { rpc, .. } => rpc.rpc.as_ref(),
        }
    }
}

fn init_runtime(rpc: Option<&Url>) -> anyhow::Result<ScriptRuntime> {
    let mut env_vars = EnvVars::init_from_env()?;
    if let Some(url) = rpc {
        env_vars = env_vars.with_rpc_url(url.clone());
    }
    tracing::debug!("Env vars: {:?}", env_vars);
    ScriptRuntime::init(env_vars)
}

fn parse_identifier(address: Option<String>, id: Option<u64>) -> anyhow::Result<OperatorIdentifier> {
    match (address, id) {
        (_, Some(id)) => Ok(OperatorIdentifier::Id(NodeOperatorId(id))),
        (Some(address), None) => Ok(address.parse()?),
        (None, None) => Err(anyhow::anyhow!("Either an address or --id is required")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }
    let log_format = EnvVars::init_from_env()
        .map(|env_vars| env_vars.log_format.value)
        .unwrap_or(tracing_config::LogFormat::Plain);
    tracing_config::setup_logger(tracing_config::LoggingConfig::default().use_format(log_format));

    let cli = Cli::parse();
    tracing::debug!("Args: {:?}", cli);

    let runtime = init_runtime(cli.command.rpc())?;

    match cli.command {
        Command::Check {
            address,
            id,
            json,
            detailed,
            history,
            withdrawals,
            ..
        } => {
            let identifier = parse_identifier(address, id)?;
            let flags = check::Flags {
                json,
                options: LookupOptions {
                    include_validators: detailed || history,
                    include_history: history,
                    include_withdrawals: withdrawals,
                },
            };
            match check::run(&runtime, &identifier, &flags).await? {
                check::Outcome::Found => Ok(ExitCode::SUCCESS),
                check::Outcome::NotFound => Ok(ExitCode::FAILURE),
            }
        }
        Command::Watch { address, interval, .. } => {
            let identifier: OperatorIdentifier = address.parse()?;
            scripts::watch::run(&runtime, &identifier, Duration::from_secs(interval.max(1))).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List { json, .. } => {
            scripts::list::run(&runtime, json).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
