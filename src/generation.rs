//! Answer generation over assembled context.
//!
//! Generation is a pluggable seam: the pipeline hands a provider the
//! assembled context, the conversation history, and the question, and gets
//! back one answer string. The shipped providers are an OpenAI-compatible
//! chat client and a disabled stand-in that echoes the context headline,
//! which keeps the retrieval pipeline usable with no model configured.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GenerationConfig;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a legal assistant. Answer using only the statutory \
excerpts provided in the context. Cite the article numbers you relied on. If the context does \
not cover the question, say so rather than speculating.";

/// Inputs for one generation call.
#[derive(Debug, Clone, Default)]
pub struct PromptSections {
    /// Assembled statutory context, already bounded.
    pub context: String,
    /// Rendered conversation history, empty for the first turn.
    pub history: String,
    pub question: String,
}

/// Render the user-message body sent to the model.
pub fn build_prompt(sections: &PromptSections) -> String {
    let mut prompt = String::new();
    if !sections.history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&sections.history);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Context:\n");
    prompt.push_str(&sections.context);
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(&sections.question);
    prompt
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, sections: &PromptSections) -> Result<String>;
}

/// Create the configured [`GenerationProvider`].
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGeneration)),
        "openai" => Ok(Box::new(OpenAiChatProvider::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// No-model provider: returns the retrieved context verbatim, prefixed so
/// callers can tell no synthesis happened.
pub struct DisabledGeneration;

#[async_trait]
impl GenerationProvider for DisabledGeneration {
    async fn generate(&self, sections: &PromptSections) -> Result<String> {
        Ok(format!(
            "Relevant legal provisions:\n\n{}",
            sections.context
        ))
    }
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_retries: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiChatProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for openai provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set for the openai generation provider")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChatProvider {
    async fn generate(&self, sections: &PromptSections) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(sections) },
            ],
        });

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("Chat request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: ChatResponse = response
                    .json()
                    .await
                    .context("Failed to decode chat completion response")?;
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| anyhow::anyhow!("Chat completion returned no choices"));
            }

            if status.as_u16() == 429 || status.is_server_error() {
                let text = response.text().await.unwrap_or_default();
                last_err = Some(anyhow::anyhow!("Chat API error {}: {}", status, text));
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            bail!("Chat API error {}: {}", status, text);
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Chat request failed after retries")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_without_history() {
        let prompt = build_prompt(&PromptSections {
            context: "Source: Constitution - Article 1\nContent: text".to_string(),
            history: String::new(),
            question: "What does Article 1 say?".to_string(),
        });
        assert!(prompt.starts_with("Context:\n"));
        assert!(prompt.ends_with("Question: What does Article 1 say?"));
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn test_build_prompt_with_history() {
        let prompt = build_prompt(&PromptSections {
            context: "ctx".to_string(),
            history: "Human: hi\nAssistant: hello".to_string(),
            question: "next?".to_string(),
        });
        assert!(prompt.starts_with("Conversation so far:\nHuman: hi"));
        let history_pos = prompt.find("Conversation so far").unwrap();
        let context_pos = prompt.find("Context:").unwrap();
        assert!(history_pos < context_pos);
    }

    #[tokio::test]
    async fn test_disabled_provider_echoes_context() {
        let provider = DisabledGeneration;
        let answer = provider
            .generate(&PromptSections {
                context: "Source: Code - Article 2".to_string(),
                history: String::new(),
                question: "anything".to_string(),
            })
            .await
            .unwrap();
        assert!(answer.contains("Source: Code - Article 2"));
        assert!(answer.starts_with("Relevant legal provisions:"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = GenerationConfig {
            provider: "mystery".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
