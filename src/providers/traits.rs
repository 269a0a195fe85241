use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Core completion trait — implement for any chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Canonical provider name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Single-turn completion: the raw user text goes out, reply text
    /// comes back. `Ok` is guaranteed non-empty; an empty provider reply
    /// is a failure, not a success with empty content.
    async fn complete(&self, message: &str, model: &str) -> anyhow::Result<String>;

    /// Check that the provider endpoint is reachable with the configured
    /// credential.
    async fn health_check(&self) -> bool {
        true
    }
}
