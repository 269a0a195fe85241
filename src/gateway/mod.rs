//! Axum-based HTTP gateway for the WeChat webhook surface.
//!
//! The platform talks to one path: a GET for the one-time URL handshake
//! and POSTs for pushed messages. Handshake failures surface as 400/403;
//! the message path always answers 200 with well-formed reply XML, since
//! the platform treats anything else as a delivery failure and
//! redelivers aggressively.

use crate::config::Config;
use crate::providers::{self, Provider};
use crate::wechat::dispatch::dispatch;
use crate::wechat::reply::{render_reply, RenderPolicy};
use crate::wechat::signature::VerificationRequest;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — pushed message payloads are tiny.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) — prevents slow-loris attacks.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fixed handshake failure bodies. The computed digest is never echoed.
const MISSING_PARAMETER_BODY: &str = "参数缺失";
const VERIFY_FAILED_BODY: &str = "验证失败";

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn Provider>,
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();

    let provider: Arc<dyn Provider> = Arc::from(providers::create_provider(
        &config.provider.name,
        config.provider.api_key.as_deref(),
        config.provider.api_url.as_deref(),
        config.provider.timeout_secs,
        config.provider.connect_timeout_secs,
    )?);

    if config.wechat.token.is_empty() {
        tracing::warn!("WeChat handshake token is empty; URL verification will be rejected");
    }

    let state = AppState {
        config: Arc::new(config),
        provider,
    };

    tracing::info!("WeClaw gateway listening on {host}:{actual_port}");
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the gateway router with its middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/wechat", get(handle_wechat_verify))
        .route("/wechat", post(handle_wechat_message))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// GET /health — liveness probe (no secrets leaked).
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct WeChatVerifyQuery {
    signature: Option<String>,
    timestamp: Option<String>,
    nonce: Option<String>,
    echostr: Option<String>,
}

/// GET /wechat — platform URL verification (one-time handshake).
async fn handle_wechat_verify(
    State(state): State<AppState>,
    Query(params): Query<WeChatVerifyQuery>,
) -> impl IntoResponse {
    let request = match VerificationRequest::from_parts(
        params.signature,
        params.timestamp,
        params.nonce,
        params.echostr,
    ) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("handshake rejected: {e}");
            return (StatusCode::BAD_REQUEST, MISSING_PARAMETER_BODY.to_string());
        }
    };

    match request.verify(&state.config.wechat.token) {
        Ok(()) => {
            tracing::info!("WeChat URL verification succeeded");
            (StatusCode::OK, request.echostr)
        }
        Err(e) => {
            tracing::warn!("handshake rejected: {e}");
            (StatusCode::FORBIDDEN, VERIFY_FAILED_BODY.to_string())
        }
    }
}

/// POST /wechat — pushed message webhook. Always 200 with reply XML.
async fn handle_wechat_message(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let body = String::from_utf8_lossy(&body);

    let reply = dispatch(&body, state.provider.as_ref(), &state.config).await;

    let xml = render_reply(&reply, RenderPolicy::FailOpen).unwrap_or_else(|e| {
        tracing::error!("reply render failed: {e:#}");
        "<xml></xml>".to_string()
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        xml,
    )
}
