//! HTTP calls to the model behind a seat.
//!
//! One [`LlmBackend`] serves either an `OpenAI`-style chat completions API
//! or the Anthropic Messages API. Every call is sized by what the engine is
//! asking: a target pick needs a name, a bid needs a short message, and a
//! directive may carry deltas and commands. Answers are always one JSON
//! object, so `OpenAI` runs in JSON mode and Anthropic gets the opening
//! brace prefilled.

use parley_types::RequestKind;
use serde_json::Value;

use crate::config::{BackendType, LlmBackendConfig};
use crate::error::RunnerError;
use crate::prompt::RenderedPrompt;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Assistant prefill that pins Anthropic answers to a JSON object.
const JSON_PREFILL: &str = "{";

/// Sampling settings for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallProfile {
    /// Response token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl CallProfile {
    /// Budget by request kind; temperature comes from the seat's backend.
    pub const fn for_request(kind: &RequestKind, temperature: f64) -> Self {
        let max_tokens = match kind {
            RequestKind::Target { .. } => 128,
            RequestKind::Bid => 400,
            RequestKind::StateUpdate => 600,
            RequestKind::Directive => 900,
        };
        Self {
            max_tokens,
            temperature,
        }
    }
}

/// A configured model endpoint.
pub struct LlmBackend {
    client: reqwest::Client,
    config: LlmBackendConfig,
}

impl LlmBackend {
    /// Build a backend; a trailing slash on the API URL is ignored.
    pub fn new(mut config: LlmBackendConfig) -> Self {
        config.api_url = config.api_url.trim_end_matches('/').to_owned();
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Human-readable API name for logging.
    pub const fn name(&self) -> &'static str {
        match self.config.backend_type {
            BackendType::OpenAi => "openai-compatible",
            BackendType::Anthropic => "anthropic",
        }
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sampling temperature for every call.
    pub const fn temperature(&self) -> f64 {
        self.config.temperature
    }

    /// Sampling settings this backend uses for `kind`.
    pub const fn profile(&self, kind: &RequestKind) -> CallProfile {
        CallProfile::for_request(kind, self.config.temperature)
    }

    /// Send one rendered prompt and return the model's JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::LlmBackend`] if the HTTP call fails, the API
    /// answers with an error status, or the response carries no text.
    pub async fn complete(
        &self,
        prompt: &RenderedPrompt,
        kind: &RequestKind,
    ) -> Result<String, RunnerError> {
        let body = self.request_body(prompt, self.profile(kind));
        let api = &self.config.api_url;
        let request = match self.config.backend_type {
            BackendType::OpenAi => self
                .client
                .post(format!("{api}/chat/completions"))
                .bearer_auth(&self.config.api_key),
            BackendType::Anthropic => self
                .client
                .post(format!("{api}/messages"))
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failure(&format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unreadable error body: {e}"));
            return Err(self.failure(&format!("returned {status}: {detail}")));
        }
        let json: Value = response
            .json()
            .await
            .map_err(|e| self.failure(&format!("response was not JSON: {e}")))?;
        self.answer_text(&json)
    }

    fn request_body(&self, prompt: &RenderedPrompt, profile: CallProfile) -> Value {
        let model = &self.config.model;
        match self.config.backend_type {
            BackendType::OpenAi => serde_json::json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": prompt.system},
                    {"role": "user", "content": prompt.user}
                ],
                "temperature": profile.temperature,
                "max_tokens": profile.max_tokens,
                "response_format": {"type": "json_object"}
            }),
            BackendType::Anthropic => serde_json::json!({
                "model": model,
                "system": prompt.system,
                "messages": [
                    {"role": "user", "content": prompt.user},
                    {"role": "assistant", "content": JSON_PREFILL}
                ],
                "temperature": profile.temperature,
                "max_tokens": profile.max_tokens
            }),
        }
    }

    /// The answer text, with the Anthropic prefill restored.
    fn answer_text(&self, json: &Value) -> Result<String, RunnerError> {
        let text = match self.config.backend_type {
            BackendType::OpenAi => json
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            BackendType::Anthropic => json
                .pointer("/content/0/text")
                .and_then(Value::as_str)
                .map(|text| {
                    if text.trim_start().starts_with(JSON_PREFILL) {
                        text.to_owned()
                    } else {
                        format!("{JSON_PREFILL}{text}")
                    }
                }),
        };
        text.ok_or_else(|| self.failure("response has no text content"))
    }

    fn failure(&self, detail: &str) -> RunnerError {
        RunnerError::LlmBackend(format!("{} ({}) {detail}", self.name(), self.config.model))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend(backend_type: BackendType, temperature: f64) -> LlmBackend {
        LlmBackend::new(LlmBackendConfig {
            backend_type,
            api_url: "https://llm.example/v1/".to_owned(),
            api_key: "test".to_owned(),
            model: "test-model".to_owned(),
            temperature,
        })
    }

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            system: "You are P2.".to_owned(),
            user: "Vote now.".to_owned(),
        }
    }

    fn target() -> RequestKind {
        RequestKind::Target {
            prompt: "Vote".to_owned(),
            candidates: vec!["P1".to_owned()],
        }
    }

    #[test]
    fn budgets_follow_the_request_kind() {
        let b = backend(BackendType::OpenAi, 0.7);
        let pick = b.profile(&target()).max_tokens;
        let bid = b.profile(&RequestKind::Bid).max_tokens;
        let directive = b.profile(&RequestKind::Directive).max_tokens;
        assert!(pick < bid && bid < directive);
    }

    #[test]
    fn openai_body_is_json_mode_with_the_seat_settings() {
        let b = backend(BackendType::OpenAi, 0.25);
        let body = b.request_body(&prompt(), b.profile(&target()));
        assert_eq!(body.pointer("/response_format/type"), Some(&Value::from("json_object")));
        assert_eq!(body.pointer("/max_tokens"), Some(&Value::from(128)));
        assert_eq!(body.pointer("/temperature"), Some(&Value::from(0.25)));
        assert_eq!(body.pointer("/messages/0/content"), Some(&Value::from("You are P2.")));
    }

    #[test]
    fn anthropic_body_prefills_the_object() {
        let b = backend(BackendType::Anthropic, 0.2);
        let body = b.request_body(&prompt(), b.profile(&RequestKind::Directive));
        assert_eq!(body.pointer("/system"), Some(&Value::from("You are P2.")));
        assert_eq!(body.pointer("/messages/1/role"), Some(&Value::from("assistant")));
        assert_eq!(body.pointer("/messages/1/content"), Some(&Value::from(JSON_PREFILL)));
        assert_eq!(body.pointer("/max_tokens"), Some(&Value::from(900)));
    }

    #[test]
    fn anthropic_answers_get_their_brace_back() {
        let b = backend(BackendType::Anthropic, 0.2);
        let cut = serde_json::json!({"content": [{"type": "text", "text": "\"target\": \"P2\"}"}]});
        assert_eq!(b.answer_text(&cut).unwrap(), r#"{"target": "P2"}"#);
        let whole = serde_json::json!({"content": [{"type": "text", "text": "{\"bid\": 0}"}]});
        assert_eq!(b.answer_text(&whole).unwrap(), r#"{"bid": 0}"#);
        assert!(b.answer_text(&serde_json::json!({"content": []})).is_err());
    }

    #[test]
    fn openai_answers_come_from_the_first_choice() {
        let b = backend(BackendType::OpenAi, 0.7);
        let ok = serde_json::json!({"choices": [{"message": {"content": "{\"bid\": 0.7}"}}]});
        assert_eq!(b.answer_text(&ok).unwrap(), r#"{"bid": 0.7}"#);
        let err = b.answer_text(&serde_json::json!({"error": "rate_limit"})).unwrap_err();
        assert!(err.to_string().contains("test-model"));
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let b = backend(BackendType::OpenAi, 0.7);
        assert_eq!(b.config.api_url, "https://llm.example/v1");
        assert_eq!(b.name(), "openai-compatible");
        assert_eq!(b.model(), "test-model");
        assert!((b.temperature() - 0.7).abs() < f64::EPSILON);
    }
}
