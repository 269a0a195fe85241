//! WeChat Official Account protocol surface: the URL-verification
//! handshake, inbound message XML, kind-based dispatch, and reply
//! rendering.

pub mod dispatch;
pub mod message;
pub mod reply;
pub mod signature;

pub use dispatch::dispatch;
pub use message::{InboundMessage, MalformedPayload, MsgKind};
pub use reply::{render_reply, OutboundReply, RenderPolicy, ReplyKind};
pub use signature::{compute_signature, HandshakeError, VerificationRequest};
