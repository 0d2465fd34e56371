use csm_dashboard_shared::csm::OperatorRewards;
use csm_dashboard_shared::io::api::{OperatorIdentifier, OperatorResponse};

use crate::operator_service::LookupOptions;
use crate::scripts::prelude::{callers, ScriptRuntime};
use crate::scripts::render::{self, Console};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    NotFound,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Flags {
    pub json: bool,
    pub options: LookupOptions,
}

pub fn describe(identifier: &OperatorIdentifier) -> String {
    match identifier {
        OperatorIdentifier::Id(id) => format!("operator #{id}"),
        OperatorIdentifier::Address(address) => format!("address {address}"),
    }
}

pub fn operator_json(rewards: &OperatorRewards) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&OperatorResponse::from(rewards))
}

pub fn not_found_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({ "error": "Operator not found" }))
}

pub async fn run(runtime: &ScriptRuntime, identifier: &OperatorIdentifier, flags: &Flags) -> anyhow::Result<Outcome> {
    tracing::info!(json = flags.json, options = ?flags.options, "Checking {}", describe(identifier));

    let spinner = (!flags.json).then(|| Console::spinner(&format!("Looking up {}...", describe(identifier))));
    let result = runtime.lookup(callers::CLI, identifier, flags.options).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result? {
        Some(rewards) => {
            if flags.json {
                println!("{}", operator_json(&rewards)?);
            } else {
                render::print_operator(&rewards);
            }
            Ok(Outcome::Found)
        }
        None => {
            if flags.json {
                println!("{}", not_found_json()?);
            } else {
                Console::error(&format!("No CSM operator found for {}", describe(identifier)));
            }
            Ok(Outcome::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use csm_dashboard_shared::csm::NodeOperatorId;

    #[test]
    fn describes_identifiers() {
        assert_eq!(describe(&OperatorIdentifier::Id(NodeOperatorId(42))), "operator #42");
        assert_eq!(
            describe(&OperatorIdentifier::Address(address!("dA7dE2ECdDfccC6c3AF10108Db212ACBBf9EA83F"))),
            "address 0xdA7dE2ECdDfccC6c3AF10108Db212ACBBf9EA83F"
        );
    }

    #[test]
    fn not_found_payload() {
        let parsed: serde_json::Value = serde_json::from_str(&not_found_json().unwrap()).unwrap();
        assert_eq!(parsed, serde_json::json!({ "error": "Operator not found" }));
    }
}
