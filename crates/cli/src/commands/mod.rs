pub mod assemble;
pub mod classify;
pub mod config_cmd;
pub mod ground;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use ctxengine_config::{ConfigError, ConfigStore, EngineConfig};
use serde::de::DeserializeOwned;

pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load the explicit file when one is given, else the default lookup.
pub fn load_config(path: Option<&Path>) -> Result<Arc<EngineConfig>, ConfigError> {
    let store = match path {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::new(),
    };
    store.get()
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> CmdResult<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("Invalid JSON in {}: {e}", path.display()).into())
}
