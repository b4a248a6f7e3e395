//! LLM client for OpenAI-compatible chat completion endpoints.

use super::http::HttpService;
use async_trait::async_trait;
use attest_application::{CollaboratorError, LlmClient, LlmPrompt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpLlmClient {
    service: HttpService,
    model: String,
}

impl HttpLlmClient {
    pub fn new(service: HttpService, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    fn request<'a>(&'a self, prompt: &'a LlmPrompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
            response_format: prompt.json.then(|| json!({"type": "json_object"})),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &LlmPrompt) -> Result<String, CollaboratorError> {
        let response: ChatResponse = self
            .service
            .post_json("chat/completions", &self.request(prompt))
            .await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CollaboratorError::InvalidResponse("empty completion".into()))?;
        debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content)
    }
}
