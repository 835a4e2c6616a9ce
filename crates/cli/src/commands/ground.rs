//! `ctxengine ground` — score generated text against provenance tags.

use std::path::Path;

use chrono::Utc;
use ctxengine_core::ProvenanceFields;
use ctxengine_grounding::GroundingVerifier;
use serde_json::Value;

use super::{CmdResult, load_config, read_json};

/// Accept a list of tags or the `assemble` output carrying them.
pub fn extract_tags(value: Value) -> serde_json::Result<Vec<ProvenanceFields>> {
    let tags = match value {
        Value::Object(mut map) => map
            .remove("_metadata")
            .and_then(|mut meta| meta.get_mut("provenance_tags").map(Value::take))
            .unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    serde_json::from_value(tags)
}

pub async fn run(config: Option<&Path>, text: &Path, tags: &Path) -> CmdResult {
    let config = load_config(config)?;
    let text = tokio::fs::read_to_string(text)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", text.display()))?;
    let tags = extract_tags(read_json(tags).await?)?;

    let verifier = GroundingVerifier::new(config.grounding.clone());
    let report = verifier.score_grounding(&text, &tags, Utc::now());

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
