//! Relevance scoring for examples and feedback turns.
//!
//! Scores are on a 0-100 scale for both strategies so one `min_score`
//! setting means the same thing whichever is active.

use querysmith_config::RankingStrategy;
use querysmith_core::{Example, FeedbackTurn};
use std::collections::BTreeSet;

/// Something that can be ranked against a question.
pub trait Candidate {
    /// The text compared with the question.
    fn text(&self) -> &str;
    fn embedding(&self) -> Option<&[f32]>;
}

impl Candidate for Example {
    fn text(&self) -> &str {
        &self.key
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }
}

impl Candidate for FeedbackTurn {
    fn text(&self) -> &str {
        &self.question
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }
}

/// A candidate with its relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored<'a, C> {
    pub item: &'a C,
    pub score: f64,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

fn join(parts: &[&String]) -> String {
    parts.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ")
}

fn prefixed(common: &str, rest: &str) -> String {
    match (common.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => common.to_string(),
        _ => format!("{common} {rest}"),
    }
}

/// Token-set similarity (0-100): word order and repeated words are ignored,
/// and a question whose words are a subset of the other's scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let common: Vec<&String> = ta.intersection(&tb).collect();
    let only_a: Vec<&String> = ta.difference(&tb).collect();
    let only_b: Vec<&String> = tb.difference(&ta).collect();
    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let common = join(&common);
    let with_a = prefixed(&common, &join(&only_a));
    let with_b = prefixed(&common, &join(&only_b));

    let mut best = ratio(&with_a, &with_b);
    if !common.is_empty() {
        best = best.max(ratio(&common, &with_a)).max(ratio(&common, &with_b));
    }
    best
}

/// Rank `candidates` against the question and keep the best `top_k` whose
/// score is at least `min_score`, highest first.
///
/// The embedding strategy skips candidates without a stored embedding and
/// falls back to lexical ranking when the question itself has none.
pub fn rank<'a, C: Candidate>(
    strategy: RankingStrategy,
    question: &str,
    question_embedding: Option<&[f32]>,
    candidates: &'a [C],
    top_k: usize,
    min_score: f64,
) -> Vec<Scored<'a, C>> {
    if top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<Scored<'a, C>> = match (strategy, question_embedding) {
        (RankingStrategy::Embedding, Some(query)) => candidates
            .iter()
            .filter_map(|c| {
                let emb = c.embedding()?;
                Some(Scored {
                    item: c,
                    score: cosine_similarity(emb, query) as f64 * 100.0,
                })
            })
            .collect(),
        _ => candidates
            .iter()
            .map(|c| Scored {
                item: c,
                score: token_set_ratio(question, c.text()),
            })
            .collect(),
    };

    scored.retain(|s| s.score >= min_score);
    // stable, so equal scores keep stored order
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}
