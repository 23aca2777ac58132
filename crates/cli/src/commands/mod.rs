//! Subcommand implementations and the setup they share.

pub mod ask;
pub mod daemon;
pub mod feedback;
pub mod init;
pub mod macros;
pub mod providers;
pub mod test_connection;

use querysmith_config::AppConfig;
use querysmith_core::{DatasetStore, GenerationModelProvider};
use querysmith_engine::{ChatService, Orchestrator, ProviderResolver, RegistryResolver};
use querysmith_store::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// The file a command reads and `init` writes.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> CliResult<AppConfig> {
    let config = AppConfig::load_with_env(&config_path(explicit))
        .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

/// Open the database and bring it in line with the config's catalog.
pub async fn open_store(config: &AppConfig) -> CliResult<Arc<SqliteStore>> {
    if let Some(parent) = sqlite_file(&config.storage.database_url).and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = SqliteStore::new(&config.storage.database_url).await?;
    let report = store.sync_catalog(&config.catalog).await?;
    debug!(?report, "Catalog synced");
    Ok(Arc::new(store))
}

pub fn chat_service(config: &AppConfig, store: Arc<SqliteStore>) -> ChatService {
    let orchestrator = Orchestrator::new(config.engine.clone(), config.prompts.clone(), store.clone());
    ChatService::new(store, orchestrator)
}

/// The active generation model, if one is configured with valid settings.
pub async fn active_generation_model(
    store: &dyn DatasetStore,
) -> CliResult<Option<Arc<dyn GenerationModelProvider>>> {
    let Some(model) = store.active_model().await? else {
        return Ok(None);
    };
    let llm = RegistryResolver.generation_model(&model)?;
    llm.validate_settings()?;
    Ok(Some(llm))
}

fn sqlite_file(url: &str) -> Option<&Path> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next()?;
    if path.is_empty() || path.contains(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_urls_map_to_files() {
        assert_eq!(
            sqlite_file("sqlite:///var/lib/qs/querysmith.db"),
            Some(Path::new("/var/lib/qs/querysmith.db"))
        );
        assert_eq!(sqlite_file("sqlite:local.db?mode=rwc"), Some(Path::new("local.db")));
        assert_eq!(sqlite_file("sqlite::memory:"), None);
        assert_eq!(sqlite_file("postgres://localhost/db"), None);
    }

    #[test]
    fn explicit_config_path_wins() {
        assert_eq!(config_path(Some(Path::new("/etc/qs.toml"))), PathBuf::from("/etc/qs.toml"));
        assert!(config_path(None).ends_with("config.toml"));
    }
}
