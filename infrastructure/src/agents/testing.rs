//! Canned collaborators for the agent tests.

use async_trait::async_trait;
use attest_application::{CollaboratorError, EmbeddingClient, LlmClient, LlmPrompt};
use std::sync::Mutex;

/// LLM that always answers with the same reply and records every prompt.
pub struct CannedLlm {
    reply: String,
    prompts: Mutex<Vec<LlmPrompt>>,
}

impl CannedLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<LlmPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, prompt: &LlmPrompt) -> Result<String, CollaboratorError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.reply.clone())
    }
}

/// Embedding that maps every text to the same vector.
pub struct FixedEmbedding {
    vector: Vec<f32>,
}

impl FixedEmbedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl EmbeddingClient for FixedEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}
