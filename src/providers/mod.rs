//! Completion provider subsystem.
//!
//! Providers implement the [`Provider`] trait and are created through the
//! factory function [`create_provider`] by their canonical string key.
//! All shipped backends speak the OpenAI-compatible chat-completions
//! format, so the factory mostly resolves aliases to base URLs.

pub mod compatible;
pub mod traits;

pub use traits::{ChatMessage, Provider};

use compatible::OpenAiCompatibleProvider;

const MAX_API_ERROR_CHARS: usize = 200;
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const QWEN_CN_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const QWEN_INTL_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";

pub(crate) fn is_qwen_cn_alias(name: &str) -> bool {
    matches!(name, "qwen" | "dashscope" | "qwen-cn" | "dashscope-cn")
}

pub(crate) fn is_qwen_intl_alias(name: &str) -> bool {
    matches!(name, "qwen-intl" | "dashscope-intl")
}

/// Create a provider by canonical name.
///
/// `base_url` overrides the alias default; an unknown name with an
/// explicit `base_url` is treated as a custom OpenAI-compatible endpoint.
pub fn create_provider(
    name: &str,
    credential: Option<&str>,
    base_url: Option<&str>,
    timeout_secs: u64,
    connect_timeout_secs: u64,
) -> anyhow::Result<Box<dyn Provider>> {
    let build = |canonical: &str, default_url: &str| -> Box<dyn Provider> {
        Box::new(OpenAiCompatibleProvider::new(
            canonical,
            base_url.unwrap_or(default_url),
            credential,
            timeout_secs,
            connect_timeout_secs,
        ))
    };

    if name == "openai" {
        Ok(build("openai", OPENAI_BASE_URL))
    } else if is_qwen_cn_alias(name) {
        Ok(build("qwen", QWEN_CN_BASE_URL))
    } else if is_qwen_intl_alias(name) {
        Ok(build("qwen-intl", QWEN_INTL_BASE_URL))
    } else if let Some(url) = base_url {
        Ok(Box::new(OpenAiCompatibleProvider::new(
            name,
            url,
            credential,
            timeout_secs,
            connect_timeout_secs,
        )))
    } else {
        anyhow::bail!(
            "Unknown provider '{name}'. Use 'qwen' or 'openai', or set provider.api_url \
             for a custom OpenAI-compatible endpoint."
        )
    }
}

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [(&str, usize); 8] = [
        ("sk-", 1),
        ("\"api_key\":\"", 8),
        ("\"access_token\":\"", 8),
        ("\"token\":\"", 8),
        ("api_key=", 8),
        ("access_token=", 8),
        ("Bearer ", 16),
        ("bearer ", 16),
    ];

    let mut scrubbed = input.to_string();

    for (prefix, min_len) in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);
            let token_len = end.saturating_sub(content_start);

            // Bare prefixes like "sk-" should not stop future scans.
            if token_len < min_len {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_qwen_by_alias() {
        for alias in ["qwen", "dashscope", "qwen-cn", "dashscope-cn"] {
            let p = create_provider(alias, Some("key"), None, 10, 5).unwrap();
            assert_eq!(p.name(), "qwen");
        }
    }

    #[test]
    fn creates_openai() {
        let p = create_provider("openai", Some("key"), None, 10, 5).unwrap();
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn unknown_name_with_url_is_custom_compatible() {
        let p = create_provider("my-gateway", Some("key"), Some("https://llm.internal/v1"), 10, 5)
            .unwrap();
        assert_eq!(p.name(), "my-gateway");
    }

    #[test]
    fn unknown_name_without_url_errors() {
        let err = match create_provider("mystery", Some("key"), None, 10, 5) {
            Ok(_) => panic!("expected unknown provider to error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn scrub_redacts_bearer_tokens() {
        let scrubbed =
            scrub_secret_patterns("request failed: Bearer sk-abcdef1234567890abcdef was rejected");
        assert!(!scrubbed.contains("sk-abcdef1234567890abcdef"));
        assert!(scrubbed.contains("[REDACTED]"));
    }

    #[test]
    fn scrub_redacts_json_api_keys() {
        let scrubbed = scrub_secret_patterns(r#"{"api_key":"supersecretvalue123"}"#);
        assert!(!scrubbed.contains("supersecretvalue123"));
    }

    #[test]
    fn scrub_leaves_plain_text_alone() {
        let input = "connection refused to upstream host";
        assert_eq!(scrub_secret_patterns(input), input);
    }

    #[test]
    fn sanitize_truncates_long_bodies_at_char_boundary() {
        let long = "错".repeat(500);
        let sanitized = sanitize_api_error(&long);
        assert!(sanitized.ends_with("..."));
        assert!(sanitized.chars().count() <= MAX_API_ERROR_CHARS + 3);
    }

    #[test]
    fn sanitize_passes_short_bodies_through() {
        assert_eq!(sanitize_api_error("bad gateway"), "bad gateway");
    }
}
