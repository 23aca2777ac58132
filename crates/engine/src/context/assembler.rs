//! Example and feedback selection for the query-generation prompt.
//!
//! Core examples are always included, in stored order. Semantic examples
//! and feedback turns are ranked against the question and bounded by the
//! configured top-K and minimum score.

use querysmith_config::{EngineSettings, RankingStrategy};
use querysmith_core::{Example, ExampleCategory, FeedbackTurn};
use tracing::debug;

use crate::context::ranking::rank;

/// The prompt sections produced for one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSections {
    /// Rendered example blocks, or `None` when nothing was selected.
    pub examples: Option<String>,
    pub feedback: Option<String>,
}

/// Selects and formats few-shot context.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    ranking: RankingStrategy,
    example_top_k: usize,
    example_min_score: f64,
    feedback_top_k: usize,
    feedback_min_score: f64,
}

impl ContextAssembler {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            ranking: settings.ranking,
            example_top_k: settings.example_top_k,
            example_min_score: settings.example_min_score,
            feedback_top_k: settings.feedback_top_k,
            feedback_min_score: settings.feedback_min_score,
        }
    }

    pub fn ranking(&self) -> RankingStrategy {
        self.ranking
    }

    /// Core examples, then the relevant semantic ones (best first).
    pub fn select_examples(
        &self,
        question: &str,
        candidates: &[Example],
        question_embedding: Option<&[f32]>,
    ) -> Vec<Example> {
        let (core, semantic): (Vec<Example>, Vec<Example>) = candidates
            .iter()
            .cloned()
            .partition(|e| e.category == ExampleCategory::Core);

        let ranked = rank(
            self.ranking,
            question,
            question_embedding,
            &semantic,
            self.example_top_k,
            self.example_min_score,
        );
        debug!(
            core = core.len(),
            semantic = ranked.len(),
            candidates = semantic.len(),
            "Selected examples"
        );

        let mut selected = core;
        selected.extend(ranked.into_iter().map(|s| s.item.clone()));
        selected
    }

    /// Reviewer-approved turns close enough to be reused as examples.
    pub fn select_feedback(
        &self,
        question: &str,
        candidates: &[FeedbackTurn],
        question_embedding: Option<&[f32]>,
    ) -> Vec<FeedbackTurn> {
        rank(
            self.ranking,
            question,
            question_embedding,
            candidates,
            self.feedback_top_k,
            self.feedback_min_score,
        )
        .into_iter()
        .map(|s| s.item.clone())
        .collect()
    }

    /// Select and render both sections.
    pub fn assemble(
        &self,
        question: &str,
        examples: &[Example],
        feedback: &[FeedbackTurn],
        question_embedding: Option<&[f32]>,
    ) -> ContextSections {
        let examples = self.select_examples(question, examples, question_embedding);
        let feedback = self.select_feedback(question, feedback, question_embedding);
        ContextSections {
            examples: format_blocks(examples.iter().map(|e| (e.key.as_str(), e.value.as_str()))),
            feedback: format_blocks(feedback.iter().map(|f| (f.question.as_str(), f.answer.as_str()))),
        }
    }
}

/// Render (question, answer) pairs as blank-line separated blocks.
pub fn format_blocks<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<String> {
    let blocks: Vec<String> = pairs
        .into_iter()
        .map(|(q, a)| format!("User Question: {q}\nAnswer: {a}"))
        .collect();
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(id: i64, key: &str, category: ExampleCategory) -> Example {
        Example {
            id,
            key: key.into(),
            value: format!("Q{id}"),
            category,
            embedding: None,
        }
    }

    fn turn(id: i64, question: &str) -> FeedbackTurn {
        FeedbackTurn {
            id,
            question: question.into(),
            answer: format!("F{id}"),
            embedding: None,
        }
    }

    #[test]
    fn core_examples_precede_semantic_ones() {
        let assembler = ContextAssembler::new(&EngineSettings::default());
        let candidates = vec![
            example(1, "top customers by spend", ExampleCategory::Semantic),
            example(2, "list all warehouses", ExampleCategory::Core),
            example(3, "average basket size per region", ExampleCategory::Core),
        ];
        let selected = assembler.select_examples("top customers by spend", &candidates, None);
        let ids: Vec<i64> = selected.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn irrelevant_semantic_examples_are_dropped() {
        let assembler = ContextAssembler::new(&EngineSettings::default());
        let candidates = vec![example(1, "warehouse stock levels in europe", ExampleCategory::Semantic)];
        assert!(assembler.select_examples("top customers by spend", &candidates, None).is_empty());
    }

    #[test]
    fn feedback_uses_the_strict_threshold() {
        let assembler = ContextAssembler::new(&EngineSettings::default());
        let turns = vec![turn(1, "Top customers by spend?"), turn(2, "top customers by revenue this year")];
        let selected = assembler.select_feedback("top customers by spend", &turns, None);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, 1);
    }

    #[test]
    fn sections_render_two_line_blocks() {
        let assembler = ContextAssembler::new(&EngineSettings::default());
        let sections = assembler.assemble(
            "anything",
            &[
                example(1, "count orders", ExampleCategory::Core),
                example(2, "count refunds", ExampleCategory::Core),
            ],
            &[],
            None,
        );
        assert_eq!(
            sections.examples.as_deref(),
            Some("User Question: count orders\nAnswer: Q1\n\nUser Question: count refunds\nAnswer: Q2")
        );
        assert_eq!(sections.feedback, None);
    }

    #[test]
    fn empty_candidates_yield_no_block() {
        assert_eq!(format_blocks(std::iter::empty()), None);
    }
}
