//! Ollama reasoner
//!
//! Implements the [`Reasoner`] port against an Ollama-compatible
//! `/api/chat` endpoint, typically at http://localhost:11434.
//! The task context goes out as a JSON user message; the reply is parsed
//! with [`parse_decision`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use sdk::errors::EngineError;
use sdk::ports::{Decision, Reasoner, ReasonerContext};

use super::{parse_decision, render_context, SYSTEM_PROMPT};

/// Reasoner backed by an Ollama chat model
#[derive(Debug, Clone)]
pub struct OllamaReasoner {
    /// Base URL for the Ollama API
    base_url: String,

    /// Model name (e.g., "llama3.1:8b")
    model: String,

    client: Client,
}

impl OllamaReasoner {
    /// Create a new Ollama reasoner
    ///
    /// The HTTP client carries no timeout of its own; the task loop bounds
    /// each call.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, context: &ReasonerContext) -> Result<OllamaRequest, EngineError> {
        Ok(OllamaRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: render_context(context)?,
                },
            ],
            stream: false,
            format: "json".to_string(),
        })
    }
}

#[async_trait]
impl Reasoner for OllamaReasoner {
    async fn decide(&self, context: &ReasonerContext) -> Result<Decision, EngineError> {
        let request = self.build_request(context)?;

        tracing::debug!(
            "Ollama request: model={}, steps={}, errors={}",
            self.model,
            context.steps.len(),
            context.errors.len()
        );

        let url = format!("{}/api/chat", self.base_url);
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EngineError::Reasoner(format!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.base_url
                    ))
                } else {
                    EngineError::Network(e.to_string())
                }
            })?;

        tracing::info!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Reasoner(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            EngineError::ReasonerParse(format!("Failed to parse Ollama response: {}", e))
        })?;

        parse_decision(&ollama_response.message.content)
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    format: String,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::ports::StepSummary;

    #[test]
    fn test_trailing_slash_trimmed() {
        let reasoner = OllamaReasoner::new("http://localhost:11434/", "llama3.1:8b").unwrap();
        assert_eq!(reasoner.base_url, "http://localhost:11434");
        assert_eq!(reasoner.model(), "llama3.1:8b");
    }

    #[test]
    fn test_request_carries_context() {
        let reasoner = OllamaReasoner::new("http://localhost:11434", "llama3.1:8b").unwrap();
        let context = ReasonerContext {
            description: "open notepad".to_string(),
            steps: vec![StepSummary {
                description: "Open notepad".to_string(),
                success: false,
                error: Some("no ack".to_string()),
            }],
            errors: vec!["no ack".to_string()],
        };

        let request = reasoner.build_request(&context).unwrap();

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");
        assert!(request.messages[1].content.contains("open notepad"));
        assert!(!request.stream);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.1:8b");
        assert_eq!(json["format"], "json");
    }
}
