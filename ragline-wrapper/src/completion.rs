//! OpenAI chat completion wire types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Incoming `POST /chat/completions` body. Anything else clients send is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    #[serde(default)]
    pub stream: Option<bool>,
}

impl CompletionRequest {
    /// Streaming unless the client explicitly asks otherwise.
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(true)
    }

    /// Content of the most recent non-empty `user` message.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role.eq_ignore_ascii_case("user"))
            .map(|m| m.content.as_str())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Non-streaming response.
#[derive(Debug, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatCompletion {
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion",
            choices: vec![CompletionChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant",
                    content: content.into(),
                },
                finish_reason: "stop",
            }],
        }
    }
}

/// One streamed piece of an answer.
#[derive(Debug, Serialize)]
pub struct CompletionChunk<'a> {
    pub id: &'a str,
    pub object: &'static str,
    pub choices: [ChunkChoice<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice<'a> {
    pub delta: Delta<'a>,
}

#[derive(Debug, Serialize)]
pub struct Delta<'a> {
    pub content: &'a str,
}

impl<'a> CompletionChunk<'a> {
    pub fn new(id: &'a str, content: &'a str) -> Self {
        Self {
            id,
            object: "chat.completion.chunk",
            choices: [ChunkChoice {
                delta: Delta { content },
            }],
        }
    }
}
