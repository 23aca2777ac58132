//! `querysmith init`: Write a default configuration file.

use querysmith_config::AppConfig;
use std::path::Path;

use super::{CliResult, config_path};

pub async fn run(explicit: Option<&Path>, force: bool) -> CliResult {
    let path = config_path(explicit);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if path.exists() && !force {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Created config at: {}", path.display());
    println!("\n📝 Next steps:");
    println!("   1. Add a [[catalog.models]] entry and set its api_key (or QUERYSMITH_API_KEY)");
    println!("   2. Add [[catalog.connections]] and [[catalog.datasets]] for your data");
    println!("   3. Run: querysmith test-connection");
    println!("   4. Run: querysmith ask -d <dataset> \"your question\"\n");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_a_loadable_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        run(Some(&path), false).await.unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.retention.keep_days, 30);
    }

    #[tokio::test]
    async fn keeps_an_existing_file_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# mine\n").unwrap();

        run(Some(&path), false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");

        run(Some(&path), true).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[retention]"));
    }
}
