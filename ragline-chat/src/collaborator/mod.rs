//! External collaborators: the retrieval server and the language model.
//!
//! Both are plain HTTP services. The traits exist so the conversation logic
//! can be exercised without either of them running.

mod lightrag;
mod openai;

pub use lightrag::{LightRagBypass, LightRagRetriever};
pub use openai::OpenAiChat;

use async_trait::async_trait;
use ragline_common::config::{Config, LlmProvider};
use ragline_common::{HistoryMessage, LightRagClient, Result};
use std::sync::Arc;
use std::time::Duration;

/// Knowledge-graph backed answering.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Answer `query` using the knowledge base, with the conversation so far.
    async fn retrieve(&self, query: &str, history: &[HistoryMessage]) -> Result<String>;
}

/// Short free-form completions (verdicts, clarifying questions).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Complete `instruction` in the context of `history`.
    async fn complete(&self, instruction: &str, history: &[HistoryMessage]) -> Result<String>;
}

/// Build both collaborators from configuration.
pub fn from_config(config: &Config) -> (Arc<dyn Retriever>, Arc<dyn LanguageModel>) {
    let client = LightRagClient::new(&config.lightrag);
    let retriever: Arc<dyn Retriever> = Arc::new(LightRagRetriever::new(client.clone()));

    let language: Arc<dyn LanguageModel> = match config.llm.provider {
        LlmProvider::Lightrag => Arc::new(LightRagBypass::new(client.with_timeout(
            Duration::from_secs(config.lightrag.decision_timeout_secs),
        ))),
        LlmProvider::Openai => Arc::new(OpenAiChat::new(&config.llm)),
    };

    tracing::info!(
        lightrag = %client.url(),
        language = language.name(),
        "Collaborators configured"
    );

    (retriever, language)
}
