//! ragline-wrapper - OpenAI-compatible chat completions over LightRAG.
//!
//! Voice and chat front-ends that only speak the OpenAI protocol point at
//! `POST /chat/completions`; the last user message is answered from the
//! knowledge graph, streamed as server-sent events by default.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod completion;
pub mod error;
pub mod routes;
pub mod stream;

pub use completion::{ChatCompletion, CompletionChunk, CompletionRequest};
pub use error::WrapperError;
pub use routes::{build_router, AppState};
pub use stream::{extract_stream_text, LineBuffer, StreamText};
