//! Prompt macros: `{NAME}` placeholders resolved from the request context.
//!
//! Resolution is per name. A name that cannot be resolved is logged and
//! dropped, and its placeholder stays in the text verbatim.

use chrono::{Datelike, Months, NaiveDate};
use querysmith_core::MacroError;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("static regex"));

/// Everything a macro may be resolved from.
#[derive(Debug, Clone)]
pub struct MacroContext<'a> {
    /// The calendar date date macros are relative to.
    pub today: NaiveDate,
    /// Query-engine kind, e.g. `elasticsearch`.
    pub db_type: &'a str,
    pub dataset_refs: &'a [String],
    pub schema: Option<&'a str>,
    pub chat_history: Option<&'a str>,
    pub default_row_count: u64,
    pub max_row_count: u64,
}

/// A built-in macro as listed for prompt authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroInfo {
    pub name: &'static str,
    pub description: &'static str,
}

const BUILTINS: &[(&str, &str)] = &[
    ("CURRENT_DATE", "Today's date (YYYY-MM-DD)"),
    ("LAST_DATE", "Yesterday's date (YYYY-MM-DD)"),
    ("NEXT_DATE", "Tomorrow's date (YYYY-MM-DD)"),
    ("CURRENT_MONTH", "The current month (YYYY-MM)"),
    ("LAST_MONTH", "Today's date minus one calendar month (YYYY-MM-DD)"),
    ("NEXT_MONTH", "Today's date plus one calendar month (YYYY-MM-DD)"),
    ("LAST_MONTH_START_END", "First and last day of the previous month"),
    ("CURRENT_YEAR", "The current year"),
    ("LAST_YEAR", "The previous year"),
    ("NEXT_YEAR", "The next year"),
    ("TABLE_NAMES", "The dataset's tables, quoted and comma separated"),
    ("INDEX_NAMES", "The dataset's indices, quoted and comma separated"),
    ("TABLE_INFO", "Schema text for the dataset's tables"),
    ("SCHEMA", "Schema text for the dataset's indices"),
    ("CHAT_HISTORY", "Recent messages of the current session"),
    ("DEFAULT_ROW_COUNT", "Rows returned when the question names no count"),
    ("MAX_ROW_COUNT", "Upper bound on rows returned by any query"),
    ("DB_TYPE", "The query engine kind"),
];

/// Every `{NAME}` placeholder in `text`, deduplicated in first-seen order.
pub fn find_macros(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace each placeholder found in `resolved`. Others are left as-is.
pub fn substitute(text: &str, resolved: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match resolved.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Resolves the built-in macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroResolver;

impl MacroResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn catalog(&self) -> Vec<MacroInfo> {
        BUILTINS
            .iter()
            .map(|&(name, description)| MacroInfo { name, description })
            .collect()
    }

    /// Resolve one macro. Names are matched case-insensitively.
    pub fn resolve(&self, name: &str, ctx: &MacroContext<'_>) -> Result<String, MacroError> {
        let today = ctx.today;
        let unavailable = || MacroError::Unavailable(name.to_string());
        let value = match name.to_ascii_uppercase().as_str() {
            "CURRENT_DATE" => ymd(today),
            "LAST_DATE" => ymd(today.pred_opt().ok_or_else(unavailable)?),
            "NEXT_DATE" => ymd(today.succ_opt().ok_or_else(unavailable)?),
            "CURRENT_MONTH" => today.format("%Y-%m").to_string(),
            "LAST_MONTH" => ymd(today.checked_sub_months(Months::new(1)).ok_or_else(unavailable)?),
            "NEXT_MONTH" => ymd(today.checked_add_months(Months::new(1)).ok_or_else(unavailable)?),
            "LAST_MONTH_START_END" => {
                let (first, last) = previous_month_range(today).ok_or_else(unavailable)?;
                format!("{} to {}", ymd(first), ymd(last))
            }
            "CURRENT_YEAR" => today.year().to_string(),
            "LAST_YEAR" => (today.year() - 1).to_string(),
            "NEXT_YEAR" => (today.year() + 1).to_string(),
            "TABLE_NAMES" | "INDEX_NAMES" => ctx
                .dataset_refs
                .iter()
                .map(|r| format!("\"{r}\""))
                .collect::<Vec<_>>()
                .join(", "),
            "TABLE_INFO" | "SCHEMA" => ctx.schema.ok_or_else(unavailable)?.to_string(),
            "CHAT_HISTORY" => ctx.chat_history.unwrap_or_default().to_string(),
            "DEFAULT_ROW_COUNT" => ctx.default_row_count.to_string(),
            "MAX_ROW_COUNT" => ctx.max_row_count.to_string(),
            "DB_TYPE" => ctx.db_type.to_string(),
            _ => return Err(MacroError::Undefined(name.to_string())),
        };
        Ok(value)
    }

    /// Resolve each name independently, keyed by the name as written.
    pub fn resolve_all(&self, names: &[String], ctx: &MacroContext<'_>) -> HashMap<String, String> {
        let mut resolved = HashMap::with_capacity(names.len());
        for name in names {
            match self.resolve(name, ctx) {
                Ok(value) => {
                    resolved.insert(name.clone(), value);
                }
                Err(MacroError::Undefined(_)) => debug!(macro_name = %name, "Leaving undefined macro in place"),
                Err(e) => warn!(macro_name = %name, "{e}"),
            }
        }
        resolved
    }

    /// Find, resolve and substitute every macro in `text`.
    pub fn expand(&self, text: &str, ctx: &MacroContext<'_>) -> String {
        let names = find_macros(text);
        if names.is_empty() {
            return text.to_string();
        }
        substitute(text, &self.resolve_all(&names, ctx))
    }
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// First and last day of the month before `today`.
fn previous_month_range(today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let last = today.with_day(1)?.pred_opt()?;
    Some((last.with_day(1)?, last))
}
