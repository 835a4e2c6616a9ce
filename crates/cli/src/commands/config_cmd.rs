//! `ctxengine config` — Configuration management commands.

use std::path::Path;

use ctxengine_config::EngineConfig;
use ctxengine_pipeline::budget_limits;

use super::{CmdResult, load_config};

pub async fn default() -> CmdResult {
    println!("{}", EngineConfig::default_toml());
    Ok(())
}

pub async fn validate(config: Option<&Path>) -> CmdResult {
    println!("🔍 Validating configuration...");

    let config = match load_config(config) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    println!();
    println!("   Trust rules:      {}", config.trust.rules.len());
    println!("   Source tiers:     {}", config.trust.source_hierarchy.len());
    println!("   Roles:            {}", config.trust.roles.len());
    for name in config.budget.profiles.keys() {
        let profile = budget_limits(&config.budget, name)?;
        println!(
            "   Profile {name:<12} {} tokens, limit {}",
            profile.max_tokens,
            profile.limit()
        );
    }
    println!("   RAG stage 1/2:    {}/{}", config.rag.stage1_top_k, config.rag.stage2_top_k);
    println!(
        "   Breaker:          {} failures, {} ms cooldown",
        config.resilience.failure_threshold, config.resilience.cooldown_ms
    );
    match &config.contracts_dir {
        Some(dir) => println!("   Contracts:        {}", dir.display()),
        None => println!("   Contracts:        built-in"),
    }
    Ok(())
}

pub async fn show(config: Option<&Path>) -> CmdResult {
    let config = load_config(config).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(config.as_ref())?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> CmdResult {
    let config_path = EngineConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
