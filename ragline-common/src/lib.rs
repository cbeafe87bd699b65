//! ragline common - shared pieces of the ragline services.
//!
//! This crate provides:
//! - Configuration types, loading and validation
//! - Error types
//! - Logging setup
//! - The LightRAG HTTP client
//! - Text helpers for collaborator output
//! - Shutdown signal handling

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod lightrag;
pub mod logging;
pub mod shutdown;
pub mod text;
pub mod validation;

pub use config::{
    Config, ConversationConfig, LightRagConfig, LlmConfig, LlmProvider, ObservabilityConfig,
    RulesConfig, WrapperConfig,
};
pub use error::{Error, Result};
pub use lightrag::{
    answer_text, response_text, HistoryMessage, LightRagClient, QueryMode, QueryRequest,
};
pub use validation::{Validate, ValidationError, ValidationResult};
