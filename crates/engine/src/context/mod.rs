//! Few-shot context assembly.
//!
//! | Section | Source | Selection |
//! |---------|--------|-----------|
//! | Examples | Dataset examples | Core always, semantic by relevance |
//! | Feedback | Turns marked correct | Near-duplicates of the question only |

pub mod assembler;
pub mod ranking;

pub use assembler::{ContextAssembler, ContextSections, format_blocks};
pub use ranking::{Candidate, Scored, cosine_similarity, rank, token_set_ratio};
