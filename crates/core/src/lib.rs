//! # querysmith core
//!
//! Domain types, traits, and error definitions for the querysmith
//! natural-language-to-query engine. This crate has **no framework
//! dependencies**: it defines the model that every other crate implements
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`GenerationModelProvider`]: prompt in, text and usage out
//! - [`QueryEngineProvider`]: validate, execute and describe queries
//! - [`DatasetStore`]: configuration, examples, history and analytics
//!
//! Implementations live in their own crates, so the engine can be tested
//! against scripted mocks and swapped between backends through configuration.

pub mod conversation;
pub mod dataset;
pub mod error;
pub mod output;
pub mod provider;
pub mod store;
pub mod usage;

pub use conversation::{ChatMessage, ChatRecord, ChatRole, SessionId, format_history};
pub use dataset::{ConnectionInfo, DatasetConfig, Example, ExampleCategory, FeedbackTurn, ModelConfig};
pub use error::{Error, GenerationError, MacroError, QueryEngineError, Result, StoreError};
pub use output::OutputShape;
pub use provider::{
    ConnectionHandle, Generation, GenerationModelProvider, QueryEngineProvider, SettingSpec,
    Validation,
};
pub use store::{DatasetStore, PurgeCounts};
pub use usage::{NanoUsd, UsageAccount};
