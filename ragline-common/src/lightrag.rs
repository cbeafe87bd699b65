//! HTTP client for the LightRAG retrieval server.
//!
//! Only the two query endpoints are used:
//!
//! - `POST /query` returns `{"response": "..."}` (some deployments answer with
//!   `answer` or `result` instead)
//! - `POST /query/stream` returns newline-delimited JSON
//!
//! Knowledge-graph construction, indexing and query routing all happen on the
//! LightRAG side.

use crate::config::LightRagConfig;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "LightRAG";

/// LightRAG retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Local,
    Global,
    Hybrid,
    Naive,
    /// Knowledge graph and vector retrieval combined.
    Mix,
    /// Skip retrieval and send the prompt straight to the configured LLM.
    Bypass,
}

/// One prior message passed as `conversation_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Body of a `/query` call.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub mode: QueryMode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conversation_history: Vec<HistoryMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_references: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            query: query.into(),
            mode,
            conversation_history: Vec::new(),
            include_references: None,
            response_type: None,
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn include_references(mut self, include: bool) -> Self {
        self.include_references = Some(include);
        self
    }

    pub fn response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = Some(response_type.into());
        self
    }
}

fn answer_field(body: &serde_json::Value) -> Option<&str> {
    ["response", "answer", "result"]
        .iter()
        .filter_map(|key| body.get(key).and_then(serde_json::Value::as_str))
        .find(|text| !text.is_empty())
}

/// Pull the answer text out of a `/query` response body.
///
/// Looks at `response`, `answer` and `result` in that order and falls back to
/// the serialized body.
pub fn answer_text(body: &serde_json::Value) -> String {
    answer_field(body).map_or_else(|| body.to_string(), str::to_string)
}

/// Like [`answer_text`], but an empty or missing answer is an empty string.
pub fn response_text(body: &serde_json::Value) -> String {
    answer_field(body).unwrap_or_default().to_string()
}

/// LightRAG HTTP client.
#[derive(Debug, Clone)]
pub struct LightRagClient {
    client: reqwest::Client,
    url: String,
    stream_url: String,
    timeout: Duration,
}

impl LightRagClient {
    /// Create a client from configuration. Queries use `lightrag.timeout_secs`.
    pub fn new(config: &LightRagConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = config.api_key {
            match HeaderValue::from_str(key) {
                Ok(value) => {
                    headers.insert("X-API-Key", value);
                }
                Err(_) => tracing::warn!("lightrag.api_key is not a valid header value, ignoring"),
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            url: config.url.clone(),
            stream_url: config.stream_url(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Same connection pool, different per-request timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a query and return the raw JSON body.
    pub async fn query_raw(&self, request: &QueryRequest) -> Result<serde_json::Value> {
        tracing::debug!(
            mode = ?request.mode,
            history = request.conversation_history.len(),
            "LightRAG query"
        );

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::from_http(SERVICE, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "{SERVICE} error: {} {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::External(format!("Failed to parse {SERVICE} response: {e}")))
    }

    /// Run a query and return the answer text, or the whole body when no
    /// answer field is present.
    pub async fn query(&self, request: &QueryRequest) -> Result<String> {
        let body = self.query_raw(request).await?;
        Ok(answer_text(&body))
    }

    /// Run a query and return only the answer field, empty when absent.
    pub async fn query_response(&self, request: &QueryRequest) -> Result<String> {
        let body = self.query_raw(request).await?;
        Ok(response_text(&body))
    }

    /// Open the streaming endpoint. Non-2xx answers are returned as errors so
    /// callers can fall back to [`query`](Self::query).
    pub async fn open_stream(&self, request: &QueryRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.stream_url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::from_http(SERVICE, &e))?;

        if !response.status().is_success() {
            return Err(Error::External(format!(
                "{SERVICE} stream error: {}",
                response.status().as_u16()
            )));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LightRagConfig {
        LightRagConfig {
            url: format!("{}/query", server.uri()),
            ..LightRagConfig::default()
        }
    }

    #[test]
    fn test_answer_text_fallbacks() {
        assert_eq!(answer_text(&json!({"response": "a"})), "a");
        assert_eq!(answer_text(&json!({"response": "", "answer": "b"})), "b");
        assert_eq!(answer_text(&json!({"result": "c"})), "c");
        assert_eq!(answer_text(&json!({"other": 1})), r#"{"other":1}"#);
    }

    #[test]
    fn test_response_text_never_returns_body() {
        assert_eq!(response_text(&json!({"response": ""})), "");
        assert_eq!(response_text(&json!({"other": 1})), "");
        assert_eq!(response_text(&json!({"response": "", "result": "c"})), "c");
    }

    #[test]
    fn test_query_request_serialization() {
        let request = QueryRequest::new("dosage of poshak?", QueryMode::Mix)
            .include_references(false)
            .response_type("Multiple Paragraphs");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["mode"], "mix");
        assert_eq!(value["include_references"], false);
        assert!(value.get("conversation_history").is_none());
    }

    #[tokio::test]
    async fn test_query_sends_payload_and_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("X-API-Key", "secret"))
            .and(body_partial_json(json!({
                "query": "hello",
                "mode": "bypass",
                "conversation_history": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "hi"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.api_key = Some("secret".into());
        let client = LightRagClient::new(&config);

        let request = QueryRequest::new("hello", QueryMode::Bypass)
            .with_history(vec![HistoryMessage::new("user", "hello")]);
        assert_eq!(client.query(&request).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(500).set_body_string("index missing"))
            .mount(&server)
            .await;

        let client = LightRagClient::new(&config_for(&server));
        let err = client
            .query(&QueryRequest::new("x", QueryMode::Mix))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::External(_)));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("index missing"));
    }

    #[tokio::test]
    async fn test_query_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            LightRagClient::new(&config_for(&server)).with_timeout(Duration::from_millis(50));
        let err = client
            .query(&QueryRequest::new("x", QueryMode::Mix))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let config = LightRagConfig {
            url: "http://127.0.0.1:1/query".into(),
            ..LightRagConfig::default()
        };
        let client = LightRagClient::new(&config);
        let err = client
            .query(&QueryRequest::new("x", QueryMode::Mix))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_open_stream_rejects_non_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/stream"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = LightRagClient::new(&config_for(&server));
        assert!(client
            .open_stream(&QueryRequest::new("x", QueryMode::Mix))
            .await
            .is_err());
    }
}
