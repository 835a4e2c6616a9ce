//! `ctxengine classify` — show how a source type is trusted.

use std::path::Path;

use ctxengine_trust::TrustResolver;

use super::{CmdResult, load_config};

pub async fn run(config: Option<&Path>, source_type: &str) -> CmdResult {
    let config = load_config(config)?;
    let resolver = TrustResolver::new(&config.trust)?;

    let trust = resolver.classify_trust(Some(source_type))?;
    println!("Source type:  {source_type}");
    println!("Trust class:  {trust}");
    match resolver.source_tier(source_type) {
        Some(entry) => println!("Authority:    tier {} ({})", entry.tier, entry.description),
        None => println!("Authority:    not in the source hierarchy"),
    }
    Ok(())
}
