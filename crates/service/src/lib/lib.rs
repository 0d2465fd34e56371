use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use csm_dashboard_scripts::consts::defaults;
use csm_dashboard_scripts::scripts::prelude::{EnvVars, ScriptRuntime};
use csm_dashboard_scripts::{env, tracing as tracing_config};
use tracing::Instrument;

pub mod common;
pub mod maintenance;
pub mod server;

use common::AppState;

pub async fn service_main() -> anyhow::Result<()> {
    let env_vars = EnvVars::init_from_env().context("Failed to read configuration")?;

    tracing_config::setup_logger(
        tracing_config::LoggingConfig::default_for_service().use_format(env_vars.log_format.value.clone()),
    );

    let bind_to: SocketAddr = env::SERVICE_BIND_TO_ADDR
        .default_str(defaults::SERVICE_BIND_TO_ADDR)
        .context("Failed to read bind address")?
        .value;

    let script_runtime = ScriptRuntime::init(env_vars).context("Failed to initialize script runtime")?;
    let state = AppState::new(script_runtime).context("Failed to register metrics")?;

    // Everything on this span will be appended to all messages
    let main_span = tracing::info_span!(
        "span:main",
        rpc = %state.script_runtime.env_vars.eth_rpc_url.value.host_str().unwrap_or_default(),
    );
    main_span.in_scope(|| state.log_config());

    let state = Arc::new(state);
    maintenance::launch(Arc::clone(&state), main_span.clone());

    server::run_server(state, bind_to, main_span.clone())
        .instrument(main_span)
        .await
}
