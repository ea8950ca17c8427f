/// LLM Client — the single point of entry for all language-model calls.
///
/// Talks to an OpenAI-compatible deployment proxy:
///   - `/openai/deployments/{chat}/chat/completions` for structured parsing
///   - `/openai/deployments/{embedding}/embeddings` for embedding vectors
///
/// No other module calls the proxy directly.
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::matching::refresh::EmbeddingSource;
use crate::matching::MatchError;

pub mod prompts;

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: Option<u32>,
}

impl ChatResponse {
    /// Text content of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    /// Kept raw; the refresh pipeline validates the shape.
    embedding: Value,
}

#[derive(Debug, Deserialize)]
struct ProxyError {
    error: ProxyErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProxyErrorBody {
    message: String,
}

/// Sampling settings for a chat call.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    chat_deployment: String,
    embedding_deployment: String,
    api_version: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            api_key: config.llm_api_key.clone(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            chat_deployment: config.llm_chat_deployment.clone(),
            embedding_deployment: config.llm_embedding_deployment.clone(),
            api_version: config.llm_api_version.clone(),
        })
    }

    pub fn chat_deployment(&self) -> &str {
        &self.chat_deployment
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.base_url, deployment, operation, self.api_version
        )
    }

    /// POSTs `body`, retrying on 429 (rate limit) and 5xx with exponential
    /// backoff. Other non-success statuses fail immediately.
    async fn post_with_retry<B: Serialize>(&self, url: &str, body: &B) -> Result<Response, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(url)
                .header("Api-Key", &self.api_key)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM proxy returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: proxy_error_message(body),
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Chat completion with a system and a user message.
    pub async fn chat(
        &self,
        system: &str,
        prompt: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let url = self.deployment_url(&self.chat_deployment, "chat/completions");
        let response: ChatResponse = self.post_with_retry(&url, &body).await?.json().await?;

        if let Some(usage) = &response.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={:?}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(response)
    }

    /// Calls the chat endpoint and deserializes the reply as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
        options: ChatOptions,
    ) -> Result<T, LlmError> {
        let response = self.chat(system, prompt, options).await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    /// Raw embedding of `text` (`data[0].embedding` of the proxy response).
    pub async fn embed_raw(&self, text: &str) -> Result<Value, LlmError> {
        let url = self.deployment_url(&self.embedding_deployment, "embeddings");
        let response: EmbeddingResponse = self
            .post_with_retry(&url, &EmbeddingRequest { input: text })
            .await?
            .json()
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyContent)
    }
}

#[async_trait]
impl EmbeddingSource for LlmClient {
    async fn embed(&self, text: &str) -> Result<Value, MatchError> {
        self.embed_raw(text)
            .await
            .map_err(|e| MatchError::Upstream(e.to_string()))
    }
}

fn proxy_error_message(body: String) -> String {
    serde_json::from_str::<ProxyError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"Name\": \"Asha\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"Name\": \"Asha\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "  {\"Skills\": []} ";
        assert_eq!(strip_json_fences(input), "{\"Skills\": []}");
    }

    #[test]
    fn test_chat_response_text_takes_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "first"}}, {"message": {"content": "second"}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), Some("first"));
    }

    #[test]
    fn test_embedding_response_keeps_raw_values() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"embedding": [0.1, "x", null]}]}"#).unwrap();
        assert_eq!(response.data[0].embedding, serde_json::json!([0.1, "x", null]));
    }

    #[test]
    fn test_proxy_error_message_extracts_message() {
        let body = r#"{"error": {"message": "deployment not found"}}"#.to_string();
        assert_eq!(proxy_error_message(body), "deployment not found");
        assert_eq!(proxy_error_message("plain".to_string()), "plain");
    }
}
