//! Reply rendering.
//!
//! Replies go back to the platform as XML with CDATA-wrapped fields, so
//! user text or model output containing markup-significant characters can
//! never corrupt the document. `CreateTime` is stamped at render time,
//! not copied from the inbound message.

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Reply kinds the platform schema defines for this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Text,
    Image,
}

impl ReplyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

/// One outbound reply. Addressing is the *swapped* addressing of the
/// inbound message: the reply's recipient is the original sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub to_user_name: Option<String>,
    pub from_user_name: Option<String>,
    pub kind: ReplyKind,
    /// Reply text for `Text`, a pre-uploaded `MediaId` for `Image`.
    pub content: String,
}

impl OutboundReply {
    pub fn text(
        to_user_name: Option<String>,
        from_user_name: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            to_user_name,
            from_user_name,
            kind: ReplyKind::Text,
            content: content.into(),
        }
    }

    pub fn image(
        to_user_name: Option<String>,
        from_user_name: Option<String>,
        media_id: impl Into<String>,
    ) -> Self {
        Self {
            to_user_name,
            from_user_name,
            kind: ReplyKind::Image,
            content: media_id.into(),
        }
    }
}

/// What to do when the reply is missing its addressing fields.
///
/// The platform treats non-200 answers and empty bodies as delivery
/// failures and redelivers the message, so production rendering runs
/// `FailOpen`: a degraded minimal document beats no document. `Strict`
/// surfaces the defect instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPolicy {
    FailOpen,
    Strict,
}

/// Render a reply document.
///
/// With both addressing fields present this is the full platform schema;
/// otherwise the policy decides between a minimal content-only document
/// and an error.
pub fn render_reply(reply: &OutboundReply, policy: RenderPolicy) -> anyhow::Result<String> {
    let addressing = match (reply.to_user_name.as_deref(), reply.from_user_name.as_deref()) {
        (Some(to), Some(from)) if !to.is_empty() && !from.is_empty() => Some((to, from)),
        _ => None,
    };

    match addressing {
        Some((to, from)) => render_full(to, from, reply),
        None => match policy {
            RenderPolicy::FailOpen => render_minimal(&reply.content),
            RenderPolicy::Strict => anyhow::bail!("reply addressing fields missing"),
        },
    }
}

fn render_full(to: &str, from: &str, reply: &OutboundReply) -> anyhow::Result<String> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Start(BytesStart::new("xml")))?;
    write_cdata_element(&mut writer, "ToUserName", to)?;
    write_cdata_element(&mut writer, "FromUserName", from)?;
    write_text_element(&mut writer, "CreateTime", &epoch_seconds().to_string())?;
    write_cdata_element(&mut writer, "MsgType", reply.kind.as_str())?;
    match reply.kind {
        ReplyKind::Text => write_cdata_element(&mut writer, "Content", &reply.content)?,
        ReplyKind::Image => {
            writer.write_event(Event::Start(BytesStart::new("Image")))?;
            write_cdata_element(&mut writer, "MediaId", &reply.content)?;
            writer.write_event(Event::End(BytesEnd::new("Image")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("xml")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Degraded document for replies without addressing: content only, no
/// structural fields. Non-conformant, but the platform accepts it over a
/// dropped message.
fn render_minimal(content: &str) -> anyhow::Result<String> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Start(BytesStart::new("xml")))?;
    write_cdata_element(&mut writer, "Content", content)?;
    writer.write_event(Event::End(BytesEnd::new("xml")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> anyhow::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_cdata_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> anyhow::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    write_cdata(writer, value)?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// A literal `]]>` inside the payload must be split across two CDATA
/// sections or it would terminate the section early.
fn write_cdata<W: std::io::Write>(writer: &mut Writer<W>, value: &str) -> anyhow::Result<()> {
    let mut rest = value;
    loop {
        match rest.find("]]>") {
            Some(idx) => {
                let (head, tail) = rest.split_at(idx + 2);
                writer.write_event(Event::CData(BytesCData::new(head)))?;
                rest = tail;
            }
            None => {
                writer.write_event(Event::CData(BytesCData::new(rest)))?;
                return Ok(());
            }
        }
    }
}

fn epoch_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
