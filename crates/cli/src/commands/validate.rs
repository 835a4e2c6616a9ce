//! `ctxengine validate` — check a package against its archetype contract.

use std::path::Path;

use ctxengine_contracts::ContractSet;
use ctxengine_contracts::validate_context;
use ctxengine_core::ContextPackage;
use serde_json::Value;

use super::{CmdResult, load_config, read_json};

/// Accept either a bare package or the `assemble` output wrapping one.
pub fn unwrap_package(value: Value) -> serde_json::Result<ContextPackage> {
    match value {
        Value::Object(mut map) if map.contains_key("_metadata") => {
            serde_json::from_value(map.remove("context").unwrap_or(Value::Null))
        }
        other => serde_json::from_value(other),
    }
}

pub async fn run(config: Option<&Path>, package: &Path, archetype: &str) -> CmdResult {
    let config = load_config(config)?;
    let contracts = ContractSet::load(config.contracts_dir.as_deref())?;
    let contract = contracts.get(archetype)?;

    let value: Value = read_json(package).await?;
    let package = unwrap_package(value)?;
    let result = validate_context(&package, contract);

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.valid {
        return Err(format!(
            "package is missing required slots for {archetype}: {}",
            result.missing_required.join(", ")
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxengine_core::Slot;
    use serde_json::json;

    #[test]
    fn bare_and_wrapped_packages_both_parse() {
        let bare = json!({"system_prompt_context": "hi"});
        let wrapped = json!({"context": {"system_prompt_context": "hi"}, "_metadata": {}});
        let a = unwrap_package(bare).unwrap();
        let b = unwrap_package(wrapped).unwrap();
        assert_eq!(a, b);
        assert!(a.contains(Slot::SystemPromptContext));
    }
}
