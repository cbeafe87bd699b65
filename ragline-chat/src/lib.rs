//! ragline-chat - clarifying-question conversation service over LightRAG.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod collaborator;
pub mod error;
pub mod manager;
pub mod policy;
pub mod routes;
pub mod session;

pub use collaborator::{LanguageModel, Retriever};
pub use error::ChatError;
pub use manager::{ConversationManager, Reply, ReplyType};
pub use policy::{QuestionRules, Verdict};
pub use routes::{build_router, AppState};
pub use session::{Session, SessionStore, Turn};
