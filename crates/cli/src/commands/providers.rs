//! `querysmith providers`: List provider kinds and their settings.

use querysmith_providers::{GenerationModelKind, QueryEngineKind};

use super::CliResult;

pub async fn run() -> CliResult {
    println!("🤖 Generation models");
    println!("====================");
    for kind in GenerationModelKind::ALL {
        println!("\n  kind = \"{}\"", kind.as_str());
        for spec in kind.settings_template() {
            let need = if spec.required { "required" } else { "optional" };
            println!("    {:<16} {need:<9} {}", spec.key, spec.description);
        }
    }

    println!("\n🗄️  Query engines");
    println!("================\n");
    for kind in QueryEngineKind::ALL {
        println!("  kind = \"{}\"", kind.as_str());
    }

    println!();
    println!("  Environment variables:");
    println!("    QUERYSMITH_API_KEY, OPENAI_API_KEY  fill a blank api_key on every model");
    println!("    QUERYSMITH_RANKING                   lexical | embedding");
    println!("    QUERYSMITH_DATABASE_URL              overrides storage.database_url");

    Ok(())
}
