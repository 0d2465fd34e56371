use anyhow::Context;
use csm_dashboard_shared::io::api::OperatorListResponse;
use itertools::Itertools;

use crate::scripts::prelude::ScriptRuntime;
use crate::scripts::render::Console;

pub async fn run(runtime: &ScriptRuntime, json: bool) -> anyhow::Result<OperatorListResponse> {
    let spinner = (!json).then(|| Console::spinner("Fetching rewards tree..."));
    let ids = runtime.operator_service.get_all_operators_with_rewards().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let response = OperatorListResponse::from(ids.context("Failed to list operators")?);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        Console::success(&format!("Found {} operators with rewards", response.count));
        println!("{}", response.operator_ids.iter().join(", "));
    }
    Ok(response)
}
