//! `querysmith macros`: List the prompt macros.

use querysmith_engine::MacroResolver;

use super::CliResult;

pub async fn run() -> CliResult {
    println!("Prompt macros");
    println!("=============\n");
    println!("  Use {{NAME}} in prompts, business rules or templates. Names are case-insensitive;");
    println!("  a placeholder with no value is left as written.\n");
    for info in MacroResolver::new().catalog() {
        let placeholder = format!("{{{}}}", info.name);
        println!("  {placeholder:<24} {}", info.description);
    }
    Ok(())
}
