//! OpenAI chat-completions client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use redlead_core::{AppConfig, Campaign, ConfigError, PotentialLead};

use crate::error::AiError;
use crate::parse::{parse_qualification, parse_warmup, Qualification};
use crate::prompts::{qualification_prompt, warmup_prompt};
use crate::retry::retry_with_backoff;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .finish()
    }
}

impl OpenAiConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `OPENAI_API_KEY` is unset.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: config.openai_key()?.to_string(),
            model: config.openai_model.clone(),
            timeout_secs: config.http_timeout_secs,
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_retry_backoff_base_ms,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for the OpenAI chat-completions API.
///
/// Use [`OpenAiClient::new`] for production or [`OpenAiClient::with_base_url`]
/// to point at a mock server in tests.
pub struct OpenAiClient {
    http: Client,
    config: OpenAiConfig,
    endpoint: String,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns [`AiError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed.
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed.
    pub fn with_base_url(config: OpenAiConfig, base_url: &str) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            config,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Asks the model to judge `lead` against `campaign` and draft replies.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Parse`] for a malformed verdict, or a transport or
    /// status error once retries are exhausted.
    pub async fn qualify_lead(
        &self,
        campaign: &Campaign,
        lead: &PotentialLead,
    ) -> Result<Qualification, AiError> {
        let (system, user) = qualification_prompt(campaign, lead);
        let raw = self.chat_json(&system, &user).await?;
        let mut verdict = parse_qualification(&raw)?;
        if !campaign.generate_dms {
            verdict.dm = None;
        }
        tracing::debug!(
            lead_id = %lead.id,
            relevance_score = verdict.relevance_score,
            is_lead = verdict.is_lead,
            "lead qualified by model"
        );
        Ok(verdict)
    }

    /// Asks for a short, non-promotional comment on a hot post.
    ///
    /// # Errors
    ///
    /// Same classification as [`OpenAiClient::qualify_lead`].
    pub async fn write_warmup_comment(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<String, AiError> {
        let (system, user) = warmup_prompt(subreddit, title, body);
        let raw = self.chat_json(&system, &user).await?;
        parse_warmup(&raw)
    }

    /// Sends one system + user exchange in JSON mode and returns the raw answer.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::EmptyResponse`] when the answer has no content, or a
    /// transport or status error once retries on transient failures are exhausted.
    pub async fn chat_json(&self, system: &str, user: &str) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.3,
        };

        retry_with_backoff(
            self.config.max_retries,
            self.config.backoff_base_ms,
            || self.send(&request),
        )
        .await
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String, AiError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_api_key() {
        let config = OpenAiConfig {
            api_key: "sk-secret".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 1_000,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("gpt-4o-mini"));
    }

    #[test]
    fn request_serializes_json_mode() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.3,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][1]["role"], "user");
    }
}
