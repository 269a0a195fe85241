//! Message dispatch.
//!
//! Routes one inbound message by its declared kind and produces the
//! outbound reply. Every path here terminates in *some* reply text: a
//! provider failure, a malformed payload, or an unsupported kind all
//! degrade to configured wording rather than an error, because the
//! platform redelivers anything that does not get a well-formed answer.

use crate::config::Config;
use crate::providers::Provider;
use crate::util::truncate_with_ellipsis;
use crate::wechat::message::{InboundMessage, MsgKind};
use crate::wechat::reply::OutboundReply;

/// Parse a pushed message body and produce the reply for it.
///
/// Addressing in the reply is swapped relative to the inbound message:
/// the reply's recipient is the original sender.
pub async fn dispatch(body: &str, provider: &dyn Provider, config: &Config) -> OutboundReply {
    match InboundMessage::parse(body) {
        Ok(msg) => route(msg, provider, config).await,
        Err(mal) => {
            tracing::warn!("discarding malformed inbound payload: {}", mal.reason);
            OutboundReply::text(
                mal.from_user_name,
                mal.to_user_name,
                config.reply.fallback.clone(),
            )
        }
    }
}

async fn route(msg: InboundMessage, provider: &dyn Provider, config: &Config) -> OutboundReply {
    let sender = msg.from_user_name.as_deref().unwrap_or("<unknown>");

    let content = match &msg.kind {
        MsgKind::Text => match msg.content.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(text) => {
                tracing::info!(
                    "text message from {sender}: {}",
                    truncate_with_ellipsis(text, 50)
                );
                complete_or_fallback(text, provider, config).await
            }
            None => config.reply.empty_prompt.clone(),
        },
        MsgKind::Image => match msg.pic_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => {
                tracing::info!("image message from {sender}: {url}");
                format!("{}\n图片地址: {url}", config.reply.image_ack)
            }
            None => config.reply.image_missing_url.clone(),
        },
        MsgKind::Other(kind) => {
            tracing::warn!("unsupported message kind from {sender}: {kind}");
            config.reply.unsupported.clone()
        }
    };

    OutboundReply::text(msg.from_user_name, msg.to_user_name, content)
}

async fn complete_or_fallback(text: &str, provider: &dyn Provider, config: &Config) -> String {
    match provider.complete(text, &config.provider.model).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(
                provider = provider.name(),
                "completion call failed, serving fallback: {e:#}"
            );
            config.reply.fallback.clone()
        }
    }
}
