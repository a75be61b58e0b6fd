//! OpenAI-compatible chat-completions client implementing `SuggestionEngine`.

use std::time::Duration;

use async_trait::async_trait;
use mongotune_core::{suggestion_schema, LlmSettings, OptimizationSuggestion};
use mongotune_engine::{Prompt, PromptContext, SuggestionEngine, SuggestionError};
use serde::{Deserialize, Serialize};

/// Sends each prompt to `{base_url}/chat/completions` with the suggestion
/// schema as a structured-output constraint.
#[derive(Debug, Clone)]
pub(crate) struct OpenAiSuggestionEngine {
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiSuggestionEngine {
    /// Build from settings, reading the API key through `lookup`.
    pub(crate) fn from_settings<F>(settings: &LlmSettings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        OpenAiSuggestionEngine {
            api_key: lookup(&settings.api_key_env).unwrap_or_default(),
            model: settings.model.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SuggestionEngine for OpenAiSuggestionEngine {
    async fn generate(
        &self,
        context: &PromptContext,
    ) -> Result<OptimizationSuggestion, SuggestionError> {
        if self.api_key.trim().is_empty() {
            return Err(SuggestionError::NotConfigured(
                "API key is not set".to_string(),
            ));
        }
        let request = ChatRequest::new(&self.model, context.render());
        log::debug!(
            "requesting suggestion database={} follow_up={} model={}",
            context.database,
            context.is_follow_up(),
            self.model
        );

        // ureq is synchronous, so wrap in spawn_blocking
        let api_key = self.api_key.clone();
        let endpoint = self.endpoint.clone();
        let timeout = self.timeout;
        let content = tokio::task::spawn_blocking(move || {
            call_chat_completions(&endpoint, &api_key, timeout, &request)
        })
        .await
        .map_err(|e| SuggestionError::Request(format!("task join error: {}", e)))??;

        if content.trim().is_empty() {
            return Err(SuggestionError::Empty);
        }
        Ok(OptimizationSuggestion::from_json_str(&content)?)
    }
}

// ── API call ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatRequest {
    fn new(model: &str, prompt: Prompt) -> Self {
        ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt.user,
                },
            ],
            response_format: serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "optimization_suggestion",
                    "schema": suggestion_schema(),
                },
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn first_content(response: ChatResponse) -> Result<String, SuggestionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(SuggestionError::Empty)
}

fn call_chat_completions(
    endpoint: &str,
    api_key: &str,
    timeout: Duration,
    request: &ChatRequest,
) -> Result<String, SuggestionError> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into();
    let response = agent
        .post(endpoint)
        .header("authorization", &format!("Bearer {}", api_key))
        .header("content-type", "application/json")
        .send_json(request)
        .map_err(|e| SuggestionError::Request(format!("API request failed: {}", e)))?;

    let body: ChatResponse = response.into_body().read_json().map_err(|e| {
        SuggestionError::Request(format!("failed to parse API response: {}", e))
    })?;
    first_content(body)
}
