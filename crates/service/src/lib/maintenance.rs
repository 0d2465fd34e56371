use std::sync::Arc;

use csm_dashboard_scripts::consts::defaults;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{Instrument, Span};

use crate::common::AppState;

/// Drops expired entries from every read-through cache, returns how many went.
pub fn sweep(state: &AppState) -> usize {
    let removed = state.script_runtime.operator_service.cleanup_expired_caches();
    if removed > 0 {
        tracing::debug!(removed, "Removed expired cache entries");
    }
    removed
}

async fn cleanup_loop(state: Arc<AppState>, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        sweep(&state);
    }
}

pub fn launch(state: Arc<AppState>, parent_span: Span) -> JoinHandle<()> {
    let period = Duration::from_secs(defaults::CACHE_CLEANUP_INTERVAL_SECONDS);
    tracing::info!("Cache cleanup every {} seconds", period.as_secs());
    let span = tracing::info_span!(parent: &parent_span, "cache_cleanup");
    tokio::spawn(cleanup_loop(state, period).instrument(span))
}

#[cfg(test)]
mod tests {
    use csm_dashboard_scripts::scripts::prelude::{EnvVars, ScriptRuntime};

    use super::*;

    fn state() -> Arc<AppState> {
        let env_vars = EnvVars::init_from_env()
            .expect("env")
            .with_rpc_url("http://127.0.0.1:9".parse().expect("url"));
        let runtime = ScriptRuntime::init(env_vars).expect("runtime");
        Arc::new(AppState::new(runtime).expect("state"))
    }

    #[tokio::test]
    async fn sweep_on_fresh_caches_removes_nothing() {
        assert_eq!(sweep(&state()), 0);
    }

    #[tokio::test]
    async fn cleanup_task_keeps_running() {
        let handle = launch(state(), Span::none());
        time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
