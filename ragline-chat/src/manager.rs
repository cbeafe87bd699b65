//! Conversation manager: one chat exchange at a time per session.

use crate::collaborator::{LanguageModel, Retriever};
use crate::error::ChatError;
use crate::policy::{QuestionRules, Verdict, FOLLOW_UP_DECISION_PROMPT, FOLLOW_UP_QUESTION_PROMPT};
use crate::session::{Session, SessionStore, Turn};
use ragline_common::text::{strip_references, truncate_with_ellipsis};
use ragline_common::HistoryMessage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

const MAX_SESSION_ID_CHARS: usize = 128;

/// Kind of assistant reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyType {
    FinalAnswer,
    FollowUp,
}

/// Tagged result of one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "type")]
    pub kind: ReplyType,
    pub response: String,
}

impl Reply {
    pub fn final_answer(response: impl Into<String>) -> Self {
        Self {
            kind: ReplyType::FinalAnswer,
            response: response.into(),
        }
    }

    pub fn follow_up(response: impl Into<String>) -> Self {
        Self {
            kind: ReplyType::FollowUp,
            response: response.into(),
        }
    }
}

/// Why a final answer was chosen. Only used for logging.
#[derive(Debug, Clone, Copy)]
enum Route {
    KeywordRule,
    FollowUpLimit,
    Verdict,
}

/// Validate a client-supplied session id and return it trimmed.
pub fn validate_session_id(id: &str) -> Result<&str, ChatError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ChatError::InvalidSessionId("session_id is empty".into()));
    }
    if id.chars().count() > MAX_SESSION_ID_CHARS {
        return Err(ChatError::InvalidSessionId(format!(
            "session_id longer than {MAX_SESSION_ID_CHARS} characters"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(ChatError::InvalidSessionId(
            "session_id contains control characters".into(),
        ));
    }
    Ok(id)
}

/// Owns session state and decides between a clarifying question and a
/// final answer.
pub struct ConversationManager {
    store: SessionStore,
    retriever: Arc<dyn Retriever>,
    language: Arc<dyn LanguageModel>,
    rules: QuestionRules,
}

impl ConversationManager {
    pub fn new(
        store: SessionStore,
        retriever: Arc<dyn Retriever>,
        language: Arc<dyn LanguageModel>,
        rules: QuestionRules,
    ) -> Self {
        Self {
            store,
            retriever,
            language,
            rules,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Handle one user message.
    ///
    /// The user turn and the assistant turn are committed together once the
    /// reply is known; a collaborator failure leaves the session untouched.
    pub async fn handle_message(&self, session_id: &str, text: &str) -> Result<Reply, ChatError> {
        let session_id = validate_session_id(session_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::InvalidRequest("Empty message".into()));
        }

        let start = Instant::now();
        let _turn = self.store.lock_turn(session_id).await;
        let session = self.store.get_or_create(session_id).await;

        let user_turn = Turn::user(text);
        let mut history = session.history_messages();
        history.push(user_turn.to_history());

        let route = if self.rules.requires_direct_answer(text) {
            Some(Route::KeywordRule)
        } else if session.follow_up_count >= self.store.max_follow_ups() {
            Some(Route::FollowUpLimit)
        } else if self.needs_follow_up(session_id, &history).await {
            None
        } else {
            Some(Route::Verdict)
        };

        let (reply, follow_up) = match route {
            None => {
                let question = self
                    .language
                    .complete(FOLLOW_UP_QUESTION_PROMPT, &history)
                    .await?;
                (Reply::follow_up(question), true)
            }
            Some(route) => {
                tracing::debug!(session_id = %session_id, ?route, "Answering directly");
                let answer = self.retriever.retrieve(text, &history).await?;
                (Reply::final_answer(strip_references(&answer)), false)
            }
        };

        let session = self
            .store
            .commit_exchange(
                session_id,
                user_turn,
                Turn::assistant(reply.response.clone()),
                follow_up,
            )
            .await;

        tracing::info!(
            session_id = %session_id,
            reply_type = ?reply.kind,
            follow_ups = session.follow_up_count,
            turns = session.history.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            preview = %truncate_with_ellipsis(&reply.response, 60),
            "Exchange completed"
        );

        Ok(reply)
    }

    /// Ask the language collaborator whether details are missing. Any
    /// failure counts as "answer directly".
    async fn needs_follow_up(&self, session_id: &str, history: &[HistoryMessage]) -> bool {
        match self.language.complete(FOLLOW_UP_DECISION_PROMPT, history).await {
            Ok(reply) => Verdict::parse(&reply) == Verdict::AskFollowUp,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Follow-up decision failed, answering directly"
                );
                false
            }
        }
    }

    /// Clear a session's history. Returns whether a live session existed.
    pub async fn reset(&self, session_id: &str) -> Result<bool, ChatError> {
        let session_id = validate_session_id(session_id)?;
        let _turn = self.store.lock_turn(session_id).await;
        let existed = self.store.reset(session_id).await;
        tracing::info!(session_id = %session_id, existed, "Session reset");
        Ok(existed)
    }

    /// Look up a live session.
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>, ChatError> {
        let session_id = validate_session_id(session_id)?;
        Ok(self.store.get(session_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragline_common::{Error, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records queries and answers with a fixed text.
    struct FakeRetriever {
        answer: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeRetriever {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.into(),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl Retriever for FakeRetriever {
        async fn retrieve(&self, _query: &str, _history: &[HistoryMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Timeout("LightRAG did not respond in time".into()));
            }
            Ok(self.answer.clone())
        }
    }

    /// Answers the decision prompt with `verdict` and the question prompt
    /// with `question`.
    struct FakeLanguage {
        verdict: Option<String>,
        question: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeLanguage {
        fn new(verdict: Option<&str>, question: &str) -> Arc<Self> {
            Arc::new(Self {
                verdict: verdict.map(str::to_string),
                question: question.into(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for FakeLanguage {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, instruction: &str, _history: &[HistoryMessage]) -> Result<String> {
            self.prompts.lock().unwrap().push(instruction.to_string());
            if instruction == FOLLOW_UP_DECISION_PROMPT {
                self.verdict
                    .clone()
                    .ok_or_else(|| Error::External("decision service down".into()))
            } else {
                Ok(self.question.clone())
            }
        }
    }

    fn manager(
        retriever: Arc<FakeRetriever>,
        language: Arc<FakeLanguage>,
        max_follow_ups: u32,
    ) -> ConversationManager {
        ConversationManager::new(
            SessionStore::new(1800, max_follow_ups),
            retriever,
            language,
            QuestionRules::default(),
        )
    }

    #[tokio::test]
    async fn test_keyword_question_skips_decision() {
        let retriever = FakeRetriever::answering("Poshak is a micronutrient mix.\n\nReferences\n[1] a.pdf");
        let language = FakeLanguage::new(Some("ASK_FOLLOW_UP"), "Which crop?");
        let manager = manager(retriever.clone(), language.clone(), 2);

        let reply = manager.handle_message("s1", "What is Poshak?").await.unwrap();

        assert_eq!(reply, Reply::final_answer("Poshak is a micronutrient mix."));
        assert_eq!(language.prompt_count(), 0);
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_follow_up_then_forced_final_answer() {
        let retriever = FakeRetriever::answering("Spray neem oil.");
        let language = FakeLanguage::new(Some("ASK_FOLLOW_UP"), "Which crop is affected?");
        let manager = manager(retriever.clone(), language.clone(), 2);

        let first = manager.handle_message("s1", "leaves have spots").await.unwrap();
        assert_eq!(first, Reply::follow_up("Which crop is affected?"));

        let second = manager.handle_message("s1", "tomato").await.unwrap();
        assert_eq!(second.kind, ReplyType::FollowUp);

        let third = manager.handle_message("s1", "since last week").await.unwrap();
        assert_eq!(third, Reply::final_answer("Spray neem oil."));

        let session = manager.session("s1").await.unwrap().unwrap();
        assert_eq!(session.follow_up_count, 2);
        assert_eq!(session.history.len(), 6);
        // two decisions plus two questions; the third turn never asked
        assert_eq!(language.prompt_count(), 4);
    }

    #[tokio::test]
    async fn test_answer_directly_verdict() {
        let retriever = FakeRetriever::answering("Use drip irrigation [1].");
        let language = FakeLanguage::new(Some("ANSWER_DIRECTLY"), "unused");
        let manager = manager(retriever, language, 2);

        let reply = manager.handle_message("s1", "how to save water").await.unwrap();
        assert_eq!(reply, Reply::final_answer("Use drip irrigation ."));
    }

    #[tokio::test]
    async fn test_decision_failure_answers_directly() {
        let retriever = FakeRetriever::answering("General advice.");
        let language = FakeLanguage::new(None, "unused");
        let manager = manager(retriever.clone(), language, 2);

        let reply = manager.handle_message("s1", "my cow is sick").await.unwrap();
        assert_eq!(reply.kind, ReplyType::FinalAnswer);
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_max_never_asks() {
        let retriever = FakeRetriever::answering("ok");
        let language = FakeLanguage::new(Some("ASK_FOLLOW_UP"), "?");
        let manager = manager(retriever, language.clone(), 0);

        for _ in 0..3 {
            let reply = manager.handle_message("s1", "pests in field").await.unwrap();
            assert_eq!(reply.kind, ReplyType::FinalAnswer);
        }
        assert_eq!(language.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_collaborator_failure_leaves_history_unchanged() {
        let retriever = FakeRetriever::failing();
        let language = FakeLanguage::new(Some("ANSWER_DIRECTLY"), "?");
        let manager = manager(retriever, language, 2);

        let err = manager.handle_message("s1", "soil test").await.unwrap_err();
        assert!(matches!(err, ChatError::Collaborator(ref e) if e.is_timeout()));

        let session = manager.session("s1").await.unwrap().unwrap();
        assert!(session.history.is_empty());
        assert_eq!(session.follow_up_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let manager = manager(
            FakeRetriever::answering("x"),
            FakeLanguage::new(None, "?"),
            2,
        );

        assert!(matches!(
            manager.handle_message("   ", "hi").await,
            Err(ChatError::InvalidSessionId(_))
        ));
        assert!(matches!(
            manager.handle_message("s1", "  \n").await,
            Err(ChatError::InvalidRequest(_))
        ));
        assert!(matches!(
            manager.reset(&"x".repeat(200)).await,
            Err(ChatError::InvalidSessionId(_))
        ));
        assert!(manager.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_reset_then_follow_ups_available_again() {
        let retriever = FakeRetriever::answering("answer");
        let language = FakeLanguage::new(Some("ASK_FOLLOW_UP"), "Which crop?");
        let manager = manager(retriever, language, 1);

        manager.handle_message("s1", "yellow leaves").await.unwrap();
        let forced = manager.handle_message("s1", "rice").await.unwrap();
        assert_eq!(forced.kind, ReplyType::FinalAnswer);

        assert!(manager.reset("s1").await.unwrap());
        let session = manager.session("s1").await.unwrap().unwrap();
        assert_eq!(session.id, "s1");
        assert!(session.history.is_empty());

        let again = manager.handle_message("s1", "yellow leaves").await.unwrap();
        assert_eq!(again.kind, ReplyType::FollowUp);
    }

    #[tokio::test]
    async fn test_concurrent_messages_same_session() {
        let retriever = FakeRetriever::answering("answer");
        let language = FakeLanguage::new(Some("ASK_FOLLOW_UP"), "Which crop?");
        let manager = Arc::new(manager(retriever, language, 2));

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.handle_message("shared", &format!("problem {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = manager.session("shared").await.unwrap().unwrap();
        assert_eq!(session.history.len(), 16);
        assert_eq!(session.follow_up_count, 2);
    }

    #[test]
    fn test_reply_serialization() {
        let json = serde_json::to_value(Reply::follow_up("Which crop?")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "follow_up", "response": "Which crop?"}));
    }
}
