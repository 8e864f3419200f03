//! OpenAI-compatible chat completions client.
//!
//! Sends `POST {base_url}/v1/chat/completions` with a bearer token. Plain
//! completions read `choices[0].message.content`; streamed completions
//! parse SSE `data:` chunks and yield `choices[0].delta.content`.
//! Retryable failures (transport, 429, 5xx, timeouts) are retried with
//! exponential backoff before the stream or body is handed out; a stream
//! that breaks halfway is reported, never silently restarted.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use serde_json::{Value, json};

use super::sse::SseLineParser;
use super::{ChatRequest, LanguageModel, TextStream};
use crate::config::{LlmConfig, env_var};
use crate::error::LlmError;

/// Base delay before the first retry; doubled on every attempt.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Chat completions client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: String,
    retry_delay: Duration,
}

impl ChatClient {
    /// Create a client with an explicit API key.
    pub fn new(client: reqwest::Client, config: LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            config,
            api_key: api_key.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Create a client reading the API key from the configured variable.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the variable is unset.
    pub fn from_config(client: reqwest::Client, config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = env_var(&config.api_key_env).ok_or_else(|| {
            LlmError::ConfigError(format!("{} is not set", config.api_key_env))
        })?;
        Ok(Self::new(client, config.clone(), api_key))
    }

    /// Override the base retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Build the JSON body for `request`.
    pub fn build_request(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.config.model_for(request.role.name()),
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": self.config.temperature,
            "stream": stream,
        });
        if let Some(obj) = body.as_object_mut()
            && let Some(max_tokens) = self.config.max_tokens
        {
            obj.insert("max_tokens".into(), json!(max_tokens));
        }
        body
    }

    /// One HTTP attempt; non-success statuses become errors.
    async fn send_once(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }
        Ok(response)
    }

    /// Send with bounded retries on retryable errors.
    async fn send(&self, request: &ChatRequest, body: &Value) -> Result<reqwest::Response, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        role = request.role.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_cap = (self.retry_delay.as_millis() as u64 / 4).max(1);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_cap))
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = self.build_request(request, false);
        let response = self.send(request, &body).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::ProviderError(format!("invalid completion body: {e}")))?;
        parse_completion(&payload)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let body = self.build_request(request, true);
        let response = self.send(request, &body).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut parser = SseLineParser::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::StreamError(format!("stream read error: {e}")))?;
                for event in parser.push(&chunk) {
                    if let Some(delta) = completion_delta(&event.data) {
                        yield delta;
                    }
                }
            }
            if let Some(event) = parser.flush() {
                if let Some(delta) = completion_delta(&event.data) {
                    yield delta;
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::TimeoutError(format!("LLM request timed out: {e}"))
    } else {
        LlmError::RequestError(format!("LLM request failed: {e}"))
    }
}

/// Map a non-success status to an error.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => LlmError::AuthError(format!("authentication failed: {message}")),
        429 => LlmError::RequestError(format!("rate limited: {message}")),
        code if status.is_server_error() => LlmError::RequestError(format!("HTTP {code}: {message}")),
        code => LlmError::ProviderError(format!("HTTP {code}: {message}")),
    }
}

/// Extract `error.message` from an error body, or return the body as is.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

/// Text of `choices[0].message.content`.
fn parse_completion(payload: &Value) -> Result<String, LlmError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| LlmError::ProviderError("completion has no message content".into()))
}

/// Text of `choices[0].delta.content` in one streamed chunk.
///
/// Returns `None` for `[DONE]`, role-only deltas and unparseable chunks.
fn completion_delta(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use futures_util::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            role: Role::Classify,
            system: "Tu es fiscaliste.".into(),
            user: "Question: TVA sur marge ?".into(),
        }
    }

    fn client(server: &MockServer, max_retries: u32) -> ChatClient {
        let config = LlmConfig {
            base_url: server.uri(),
            max_retries,
            timeout_seconds: 5,
            ..Default::default()
        };
        ChatClient::new(reqwest::Client::new(), config, "sk-test")
            .with_retry_delay(Duration::from_millis(5))
    }

    fn completion(text: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    #[test]
    fn request_body_uses_role_model() {
        let mut config = LlmConfig::default();
        config.models.insert("classify".into(), "gpt-4o-mini".into());
        config.max_tokens = Some(512);
        let client = ChatClient::new(reqwest::Client::new(), config, "k");
        let body = client.build_request(&request(), true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Question: TVA sur marge ?");
    }

    #[test]
    fn http_errors_are_classified() {
        let auth = map_http_error(reqwest::StatusCode::UNAUTHORIZED, r#"{"error":{"message":"bad key"}}"#);
        assert!(matches!(auth, LlmError::AuthError(ref m) if m.contains("bad key")));
        assert!(map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(map_http_error(reqwest::StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(!map_http_error(reqwest::StatusCode::BAD_REQUEST, "oops").is_retryable());
    }

    #[test]
    fn delta_extraction() {
        assert_eq!(
            completion_delta(r#"{"choices":[{"delta":{"content":"Bon"}}]}"#).as_deref(),
            Some("Bon")
        );
        assert!(completion_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
        assert!(completion_delta("[DONE]").is_none());
    }

    #[tokio::test]
    async fn complete_sends_bearer_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"issue\":\"TVA\"}")))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, 0).complete(&request()).await.expect("completion");
        assert_eq!(text, "{\"issue\":\"TVA\"}");
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;

        let text = client(&server, 2).complete(&request()).await.expect("completion");
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "invalid key"}})))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3).complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthError(_)));
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 2).complete(&request()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_content_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server, 0).complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ProviderError(_)));
    }

    #[tokio::test]
    async fn stream_yields_deltas_in_order() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"reponse\"}}]}\n\n",
            ": ping\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"_redigee\\\": \\\"ok\\\"}\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let stream = client(&server, 0).stream(&request()).await.expect("stream");
        let chunks: Vec<String> = stream.try_collect().await.expect("chunks");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), "{\"reponse_redigee\": \"ok\"}");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = LlmConfig {
            api_key_env: "FISCA_TEST_UNSET_OPENAI_KEY".into(),
            ..Default::default()
        };
        let err = ChatClient::from_config(reqwest::Client::new(), &config).unwrap_err();
        assert!(matches!(err, LlmError::ConfigError(ref m) if m.contains("FISCA_TEST_UNSET_OPENAI_KEY")));
    }
}
