//! Prompt construction.
//!
//! The query-generation system prompt is built fresh for every attempt:
//!
//! 1. Base template (the dataset's custom prompt or the engine default)
//! 2. Business rules
//! 3. Macro expansion of the text so far
//! 4. Few-shot examples
//! 5. Past feedback
//! 6. Errors from earlier attempts of the same request
//!
//! Sections 4-6 are appended after expansion, so example text is never
//! treated as a template.

use querysmith_core::{Error, Result};

use crate::context::ContextSections;
use crate::macros::{MacroContext, MacroResolver, find_macros, substitute};

const BUSINESS_RULES_HEADER: &str = "\n\nBUSINESS RULES:\n";
const EXAMPLES_HEADER: &str = "\n\nFEW-SHOT EXAMPLES:\n";
const FEEDBACK_HEADER: &str = "\n\nPAST FEEDBACK (User-validated examples of correct queries):\n";
const ERRORS_HEADER: &str = "\n\nPREVIOUS ATTEMPT ERROR:\nThe previous query generation attempts failed with \
the following error. Please fix with these errors in the query:\n";

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    resolver: MacroResolver,
}

impl PromptBuilder {
    pub fn new(resolver: MacroResolver) -> Self {
        Self { resolver }
    }

    /// The query-generation system prompt for one attempt.
    pub fn system_prompt(
        &self,
        base: &str,
        business_rules: Option<&str>,
        sections: &ContextSections,
        ctx: &MacroContext<'_>,
        prior_errors: &[String],
    ) -> Result<String> {
        let mut template = base.to_string();
        if let Some(rules) = business_rules.map(str::trim).filter(|r| !r.is_empty()) {
            template.push_str(BUSINESS_RULES_HEADER);
            template.push_str(rules);
        }

        let mut prompt = self.resolver.expand(&template, ctx);

        if let Some(examples) = &sections.examples {
            prompt.push_str(EXAMPLES_HEADER);
            prompt.push_str(examples);
        }
        if let Some(feedback) = &sections.feedback {
            prompt.push_str(FEEDBACK_HEADER);
            prompt.push_str(feedback);
        }
        if !prior_errors.is_empty() {
            prompt.push_str(ERRORS_HEADER);
            prompt.push_str(&format_attempt_errors(prior_errors));
        }

        if prompt.trim().is_empty() {
            return Err(Error::InvalidPrompt("system prompt is empty".into()));
        }
        Ok(prompt)
    }

    /// Expand macros in `template` and fill the request-specific
    /// placeholders in `extra` (e.g. `QUESTION`) in the same pass, so
    /// substituted user text is never expanded again.
    pub fn render(&self, template: &str, ctx: &MacroContext<'_>, extra: &[(&str, &str)]) -> String {
        let names: Vec<String> = find_macros(template)
            .into_iter()
            .filter(|n| !extra.iter().any(|(k, _)| k.eq_ignore_ascii_case(n)))
            .collect();
        let mut resolved = self.resolver.resolve_all(&names, ctx);
        for name in find_macros(template) {
            if let Some((_, value)) = extra.iter().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
                resolved.insert(name, value.to_string());
            }
        }
        substitute(template, &resolved)
    }
}

/// `Attempt N Error:` entries separated by blank lines.
pub fn format_attempt_errors(errors: &[String]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, msg)| format!("Attempt {} Error:\n{msg}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx<'a>(refs: &'a [String]) -> MacroContext<'a> {
        MacroContext {
            today: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            db_type: "postgres",
            dataset_refs: refs,
            schema: Some("orders(id int, total numeric)"),
            chat_history: Some("Human: hello\nAI: hi"),
            default_row_count: 10,
            max_row_count: 100,
        }
    }

    #[test]
    fn sections_appear_in_order() {
        let refs = vec!["orders".to_string()];
        let sections = ContextSections {
            examples: Some("User Question: a\nAnswer: b".into()),
            feedback: Some("User Question: c\nAnswer: d".into()),
        };
        let prompt = PromptBuilder::default()
            .system_prompt(
                "Tables {TABLE_NAMES} as of {CURRENT_DATE}",
                Some("Revenue excludes refunds."),
                &sections,
                &ctx(&refs),
                &["unknown column `spend`".into()],
            )
            .unwrap();

        assert!(prompt.starts_with("Tables \"orders\" as of 2024-06-15"));
        let rules = prompt.find("BUSINESS RULES:").unwrap();
        let examples = prompt.find("FEW-SHOT EXAMPLES:").unwrap();
        let feedback = prompt.find("PAST FEEDBACK").unwrap();
        let errors = prompt.find("PREVIOUS ATTEMPT ERROR:").unwrap();
        assert!(rules < examples && examples < feedback && feedback < errors);
        assert!(prompt.ends_with("Attempt 1 Error:\nunknown column `spend`"));
    }

    #[test]
    fn examples_are_not_expanded() {
        let refs = vec![];
        let sections = ContextSections {
            examples: Some("User Question: sales on {CURRENT_DATE}\nAnswer: x".into()),
            feedback: None,
        };
        let prompt = PromptBuilder::default()
            .system_prompt("Base", None, &sections, &ctx(&refs), &[])
            .unwrap();
        assert!(prompt.contains("sales on {CURRENT_DATE}"));
        assert!(!prompt.contains("PREVIOUS ATTEMPT ERROR"));
    }

    #[test]
    fn empty_prompt_is_invalid() {
        let refs = vec![];
        let err = PromptBuilder::default()
            .system_prompt("  ", None, &ContextSections::default(), &ctx(&refs), &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPrompt(_)));
    }

    #[test]
    fn user_text_is_substituted_once() {
        let refs = vec![];
        let out = PromptBuilder::default().render(
            "History:\n{CHAT_HISTORY}\nQuestion: {QUESTION}",
            &ctx(&refs),
            &[("QUESTION", "sales since {CURRENT_DATE}?")],
        );
        assert_eq!(out, "History:\nHuman: hello\nAI: hi\nQuestion: sales since {CURRENT_DATE}?");
    }

    #[test]
    fn attempt_errors_are_numbered() {
        let text = format_attempt_errors(&["first".into(), "second".into()]);
        assert_eq!(text, "Attempt 1 Error:\nfirst\n\nAttempt 2 Error:\nsecond");
    }
}
