//! Runtime configuration.
//!
//! Resolved once at startup from an optional `weclaw.toml` plus
//! environment overrides, then shared immutably for the life of the
//! process. Reply wording, provider timeout and model are deliberately
//! configuration knobs rather than constants.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub wechat: WeChatConfig,
    pub provider: ProviderConfig,
    pub gateway: GatewayConfig,
    pub reply: ReplyConfig,
}

/// Platform handshake settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeChatConfig {
    /// Shared handshake token, known only to this service and the
    /// platform. Empty means URL verification will always be rejected.
    pub token: String,
}

/// Completion provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider key resolved by the factory ("qwen", "openai", ...).
    pub name: String,
    pub api_key: Option<String>,
    /// Base URL override for custom OpenAI-compatible endpoints.
    pub api_url: Option<String>,
    pub model: String,
    /// Hard ceiling on one completion call. The platform redelivers
    /// after ~5s of silence, so anything beyond that only feeds retries.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "qwen".into(),
            api_key: None,
            api_url: None,
            model: "qwen-omni-turbo".into(),
            timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// HTTP gateway bind settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Fixed reply wording for the degraded paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Served on provider failure and malformed payloads.
    pub fallback: String,
    /// Served for text messages with no content.
    pub empty_prompt: String,
    /// Prefix for image acknowledgments; the image URL is appended.
    pub image_ack: String,
    /// Served for image messages that carry no URL.
    pub image_missing_url: String,
    /// Served for message kinds this service does not handle.
    pub unsupported: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            fallback: "抱歉，我暂时无法处理您的请求，请稍后再试。".into(),
            empty_prompt: "请发送一段文字内容，我会尽力回答。".into(),
            image_ack: "您发送了一张图片，我暂时无法处理此图片。".into(),
            image_missing_url: "您发送了一张图片，但我没有拿到图片地址，暂时无法处理。".into(),
            unsupported: "暂不支持该类型的消息，请发送文字内容。".into(),
        }
    }
}

impl Config {
    /// Load configuration: the given file (or `./weclaw.toml` when
    /// present), then environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new("weclaw.toml");
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Environment overrides, injectable for tests.
    fn apply_env_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| get(name).filter(|value| !value.trim().is_empty()))
        };

        if let Some(token) = first(&["WECLAW_WECHAT_TOKEN", "WECHAT_TOKEN"]) {
            self.wechat.token = token;
        }
        if let Some(key) = first(&["WECLAW_API_KEY", "DASHSCOPE_API_KEY", "OPENAI_API_KEY"]) {
            self.provider.api_key = Some(key);
        }
        if let Some(name) = first(&["WECLAW_PROVIDER"]) {
            self.provider.name = name;
        }
        if let Some(url) = first(&["WECLAW_API_URL"]) {
            self.provider.api_url = Some(url);
        }
        if let Some(model) = first(&["WECLAW_MODEL"]) {
            self.provider.model = model;
        }
        if let Some(secs) = first(&["WECLAW_PROVIDER_TIMEOUT_SECS"]) {
            match secs.parse() {
                Ok(parsed) => self.provider.timeout_secs = parsed,
                Err(_) => tracing::warn!("ignoring invalid provider timeout override: {secs}"),
            }
        }
        if let Some(host) = first(&["WECLAW_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }
        if let Some(port) = first(&["WECLAW_GATEWAY_PORT", "PORT"]) {
            match port.parse() {
                Ok(parsed) => self.gateway.port = parsed,
                Err(_) => tracing::warn!("ignoring invalid gateway port override: {port}"),
            }
        }
    }
}
