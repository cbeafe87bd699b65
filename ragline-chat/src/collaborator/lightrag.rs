//! LightRAG-backed collaborators.

use super::{LanguageModel, Retriever};
use async_trait::async_trait;
use ragline_common::{HistoryMessage, LightRagClient, QueryMode, QueryRequest, Result};

/// Final answers from the knowledge graph (`mix` mode, no references).
pub struct LightRagRetriever {
    client: LightRagClient,
}

impl LightRagRetriever {
    pub fn new(client: LightRagClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Retriever for LightRagRetriever {
    async fn retrieve(&self, query: &str, history: &[HistoryMessage]) -> Result<String> {
        let request = QueryRequest::new(query, QueryMode::Mix)
            .with_history(history.to_vec())
            .include_references(false)
            .response_type("Multiple Paragraphs");
        self.client.query_response(&request).await
    }
}

/// LightRAG in `bypass` mode: the prompt goes straight to LightRAG's LLM.
pub struct LightRagBypass {
    client: LightRagClient,
}

impl LightRagBypass {
    pub fn new(client: LightRagClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageModel for LightRagBypass {
    fn name(&self) -> &str {
        "lightrag-bypass"
    }

    async fn complete(&self, instruction: &str, history: &[HistoryMessage]) -> Result<String> {
        let request = QueryRequest::new(instruction, QueryMode::Bypass)
            .with_history(history.to_vec())
            .response_type("Single Sentence");
        let reply = self.client.query_response(&request).await?;
        Ok(reply.trim().to_string())
    }
}
