//! `querysmith test-connection`: Check that configured connections are reachable.

use querysmith_config::ConnectionEntry;
use querysmith_core::ConnectionInfo;
use std::path::Path;
use tracing::warn;

use super::{CliResult, load_config};

pub async fn run(explicit: Option<&Path>, name: Option<&str>) -> CliResult {
    let config = load_config(explicit)?;

    let selected: Vec<&ConnectionEntry> = config
        .catalog
        .connections
        .iter()
        .filter(|c| name.is_none_or(|n| c.name == n))
        .collect();
    if selected.is_empty() {
        return Err(match name {
            Some(n) => format!("No connection named '{n}' in the config").into(),
            None => "No connections configured. Add [[catalog.connections]] to the config.".into(),
        });
    }

    println!("🔌 Testing {} connection(s)\n", selected.len());
    let mut failed = 0;
    for entry in selected {
        let conn = connection_info(entry);
        let provider = match querysmith_providers::query_engine_provider(&conn.kind) {
            Ok(provider) => provider,
            Err(e) => {
                println!("  ❌ {:<20} {e}", conn.name);
                failed += 1;
                continue;
            }
        };
        match provider.connect(&conn).await {
            Ok(handle) => println!(
                "  ✅ {:<20} {} {}",
                conn.name,
                handle.engine,
                handle.server_version.as_deref().unwrap_or("")
            ),
            Err(e) => {
                warn!(connection = %conn.name, error = %e, "Connection test failed");
                println!("  ❌ {:<20} {e}", conn.name);
                failed += 1;
            }
        }
    }

    println!();
    if failed == 0 {
        println!("  🎉 All connections reachable");
        Ok(())
    } else {
        Err(format!("{failed} connection(s) failed").into())
    }
}

fn connection_info(entry: &ConnectionEntry) -> ConnectionInfo {
    ConnectionInfo {
        id: 0,
        name: entry.name.clone(),
        kind: entry.kind.clone(),
        url: entry.url.clone(),
        username: entry.username.clone(),
        password: entry.password.clone(),
        is_active: entry.active,
    }
}
