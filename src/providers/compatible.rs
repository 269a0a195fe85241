//! Generic OpenAI-compatible completion provider.
//! DashScope, OpenAI and most hosted LLM APIs speak the same
//! `/chat/completions` format; one implementation covers all of them.

use crate::providers::traits::{ChatMessage, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    credential: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// An empty or absent reply body is a failure condition, never a success
/// with empty content.
fn first_non_empty_content(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.is_empty())
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        credential: Option<&str>,
        timeout_secs: u64,
        connect_timeout_secs: u64,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.map(ToString::to_string),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        }
    }

    fn http_client(&self) -> Client {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!("Failed to build timeout client: {error}");
                Client::new()
            })
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, message: &str, model: &str) -> anyhow::Result<String> {
        let credential = self.credential.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "{} API key not set. Set WECLAW_API_KEY or edit weclaw.toml.",
                self.name
            )
        })?;

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::user(message)],
        };

        let response = self
            .http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {credential}"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        let chat_response: ChatResponse = response.json().await?;

        first_non_empty_content(chat_response)
            .ok_or_else(|| anyhow::anyhow!("empty completion from {}", self.name))
    }

    async fn health_check(&self) -> bool {
        let Some(credential) = self.credential.as_ref() else {
            return false;
        };

        self.http_client()
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {credential}"))
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("test", &server.uri(), Some("test-credential"), 2, 1)
    }

    #[test]
    fn creates_with_key() {
        let p = OpenAiCompatibleProvider::new("qwen", "https://example.com/v1", Some("key"), 10, 5);
        assert_eq!(p.name(), "qwen");
        assert_eq!(p.credential.as_deref(), Some("key"));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let p = OpenAiCompatibleProvider::new("qwen", "https://example.com/v1/", None, 10, 5);
        assert_eq!(p.base_url, "https://example.com/v1");
    }

    #[tokio::test]
    async fn complete_fails_without_key() {
        let p = OpenAiCompatibleProvider::new("qwen", "https://example.com/v1", None, 10, 5);
        let result = p.complete("hello", "qwen-omni-turbo").await;
        assert!(result.unwrap_err().to_string().contains("API key not set"));
    }

    #[test]
    fn request_serializes_single_user_turn() {
        let req = ChatRequest {
            model: "qwen-omni-turbo".to_string(),
            messages: vec![ChatMessage::user("hello")],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"model\":\"qwen-omni-turbo\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("system"));
    }

    #[test]
    fn response_deserializes_single_choice() {
        let json = r#"{"choices":[{"message":{"content":"Hi!"}}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(first_non_empty_content(resp).as_deref(), Some("Hi!"));
    }

    #[test]
    fn empty_content_counts_as_failure() {
        let json = r#"{"choices":[{"message":{"content":""}}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(first_non_empty_content(resp).is_none());
    }

    #[test]
    fn null_content_counts_as_failure() {
        let json = r#"{"choices":[{"message":{"content":null}}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(first_non_empty_content(resp).is_none());
    }

    #[test]
    fn empty_choices_counts_as_failure() {
        let json = r#"{"choices":[]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(first_non_empty_content(resp).is_none());
    }

    #[tokio::test]
    async fn complete_returns_reply_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-credential"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen-omni-turbo",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hi there"}}]
            })))
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .complete("hello", "qwen-omni-turbo")
            .await
            .unwrap();
        assert_eq!(reply, "hi there");
    }

    #[tokio::test]
    async fn complete_fails_on_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete("hello", "qwen-omni-turbo")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn complete_fails_on_empty_reply_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": ""}}]
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete("hello", "qwen-omni-turbo")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }

    #[tokio::test]
    async fn complete_times_out_rather_than_hanging() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "choices": [{"message": {"content": "too late"}}]
                    }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let provider =
            OpenAiCompatibleProvider::new("test", &server.uri(), Some("test-credential"), 1, 1);
        let started = std::time::Instant::now();
        let result = provider.complete("hello", "qwen-omni-turbo").await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn health_check_without_key_is_unhealthy() {
        let p = OpenAiCompatibleProvider::new("qwen", "https://example.com/v1", None, 10, 5);
        assert!(!p.health_check().await);
    }

    #[tokio::test]
    async fn health_check_hits_models_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("Authorization", "Bearer test-credential"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(provider_for(&server).health_check().await);
    }
}
