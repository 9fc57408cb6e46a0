//! Language model clients.
//!
//! A [`LanguageModel`] turns a fully assembled prompt into answer text with a
//! single call/response round trip. Unlike embedding, generation is never
//! retried: a failed call is reported to the user immediately as a degraded
//! answer. Every failure mode (transport, non-2xx status, malformed body,
//! empty text) maps to [`RagError::AnswerGeneration`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::{provider_api_key, LlmConfig};
use crate::error::{RagError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Create the [`LanguageModel`] named by `config.provider`.
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let api_key = provider_api_key(&config.provider)?.unwrap_or_default();
    let client = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))?;
    let model = config.model_name();
    let temperature = config.temperature;

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel {
            client,
            api_key,
            model: model.trim_start_matches("models/").to_string(),
            temperature,
            base_url: config.url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })),
        "openai" => Ok(Arc::new(OpenAIModel {
            client,
            api_key,
            model,
            temperature,
            base_url: config.url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })),
        "ollama" => Ok(Arc::new(OllamaModel {
            client,
            model,
            temperature,
            base_url: config.url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
        })),
        other => Err(RagError::Configuration(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}

/// POST `body` once and return the parsed JSON response.
async fn post_once(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| RagError::AnswerGeneration(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(RagError::AnswerGeneration(format!(
            "API error {}: {}",
            status, text
        )));
    }
    response
        .json()
        .await
        .map_err(|e| RagError::AnswerGeneration(format!("invalid response body: {}", e)))
}

fn non_empty(text: Option<String>, what: &str) -> Result<String> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(RagError::AnswerGeneration(format!(
            "model returned no {}",
            what
        ))),
    }
}

// ============ Gemini ============

pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key);
        let json = post_once(request, &body).await?;
        non_empty(parse_gemini_text(&json), "candidate text")
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_text(json: &serde_json::Value) -> Option<String> {
    let parts = json
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Some(text)
}

// ============ OpenAI ============

pub struct OpenAIModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
}

#[async_trait]
impl LanguageModel for OpenAIModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        let json = post_once(request, &body).await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string);
        non_empty(text, "message content")
    }
}

// ============ Ollama ============

pub struct OllamaModel {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    base_url: String,
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let request = self
            .client
            .post(format!("{}/api/generate", self.base_url));
        let json = post_once(request, &body).await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string);
        non_empty(text, "response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_parts_are_joined() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, " }, { "text": "world." }] }
            }]
        });
        assert_eq!(parse_gemini_text(&json).as_deref(), Some("Hello, world."));
    }

    #[test]
    fn gemini_blocked_prompt_has_no_text() {
        let json = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(parse_gemini_text(&json).is_none());
        let err = non_empty(parse_gemini_text(&json), "candidate text").unwrap_err();
        assert!(matches!(err, RagError::AnswerGeneration(_)));
    }

    #[test]
    fn whitespace_answer_rejected() {
        assert!(non_empty(Some("  \n".into()), "response").is_err());
        assert_eq!(non_empty(Some("ok".into()), "response").unwrap(), "ok");
    }

    #[test]
    fn ollama_model_needs_no_credentials() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..LlmConfig::default()
        };
        let model = create_language_model(&config).unwrap();
        assert_eq!(model.model_name(), "llama3.2");
    }
}
