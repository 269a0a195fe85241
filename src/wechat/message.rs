//! Inbound message payloads.
//!
//! The platform pushes messages as a flat XML document rooted at `<xml>`,
//! with field values in either CDATA sections or plain text nodes.
//! Parsing is deliberately tolerant: a payload that cannot be read still
//! yields whatever addressing fields were salvaged, so the caller can
//! answer with a well-formed reply instead of an HTTP error.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use thiserror::Error;

/// Declared message kind. Kinds this service does not understand are
/// preserved verbatim for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgKind {
    Text,
    Image,
    Other(String),
}

impl MsgKind {
    fn from_wire(raw: &str) -> Self {
        match raw {
            "text" => Self::Text,
            "image" => Self::Image,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Other(raw) => raw,
        }
    }
}

/// One pushed message, parsed fresh per request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The official account that received the message ("ToUserName").
    pub to_user_name: Option<String>,
    /// The end user that sent it ("FromUserName").
    pub from_user_name: Option<String>,
    pub kind: MsgKind,
    pub content: Option<String>,
    pub pic_url: Option<String>,
}

/// Parse failure carrying whatever addressing fields were salvaged before
/// the payload became unreadable.
#[derive(Debug, Error)]
#[error("malformed message payload: {reason}")]
pub struct MalformedPayload {
    pub reason: String,
    pub to_user_name: Option<String>,
    pub from_user_name: Option<String>,
}

impl InboundMessage {
    /// Parse a pushed message document.
    ///
    /// Accepts CDATA and plain text field values; consecutive text nodes
    /// within one element are concatenated. A document without an `<xml>`
    /// root or without `MsgType` is malformed.
    pub fn parse(body: &str) -> Result<Self, MalformedPayload> {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);

        let mut fields: HashMap<String, String> = HashMap::new();
        let mut saw_root = false;
        let mut depth = 0usize;
        let mut current: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    depth += 1;
                    if depth == 1 {
                        if name != "xml" {
                            return Err(malformed(
                                format!("unexpected root element <{name}>"),
                                &fields,
                            ));
                        }
                        saw_root = true;
                    } else if depth == 2 {
                        current = Some(name);
                    }
                }
                Ok(Event::End(_)) => {
                    depth = depth.saturating_sub(1);
                    if depth <= 1 {
                        current = None;
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some(name) = current.as_ref() {
                        let value = t
                            .unescape()
                            .map(std::borrow::Cow::into_owned)
                            .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                        append_field(&mut fields, name, &value);
                    }
                }
                Ok(Event::CData(t)) => {
                    if let Some(name) = current.as_ref() {
                        let value = String::from_utf8_lossy(t.as_ref()).into_owned();
                        append_field(&mut fields, name, &value);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(malformed(e.to_string(), &fields)),
            }
        }

        if !saw_root {
            return Err(malformed("missing <xml> root element".into(), &fields));
        }

        let Some(kind) = fields.remove("MsgType") else {
            return Err(malformed("missing MsgType".into(), &fields));
        };

        Ok(Self {
            to_user_name: fields.remove("ToUserName"),
            from_user_name: fields.remove("FromUserName"),
            kind: MsgKind::from_wire(&kind),
            content: fields.remove("Content"),
            pic_url: fields.remove("PicUrl"),
        })
    }
}

fn append_field(fields: &mut HashMap<String, String>, name: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    fields.entry(name.to_string()).or_default().push_str(value);
}

fn malformed(reason: String, fields: &HashMap<String, String>) -> MalformedPayload {
    MalformedPayload {
        reason,
        to_user_name: fields.get("ToUserName").cloned(),
        from_user_name: fields.get("FromUserName").cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_message_with_cdata() {
        let body = "<xml>\
            <ToUserName><![CDATA[gh_1]]></ToUserName>\
            <FromUserName><![CDATA[user_9]]></FromUserName>\
            <CreateTime>1700000000</CreateTime>\
            <MsgType><![CDATA[text]]></MsgType>\
            <Content><![CDATA[hello]]></Content>\
            <MsgId>123456</MsgId>\
            </xml>";

        let msg = InboundMessage::parse(body).unwrap();
        assert_eq!(msg.to_user_name.as_deref(), Some("gh_1"));
        assert_eq!(msg.from_user_name.as_deref(), Some("user_9"));
        assert_eq!(msg.kind, MsgKind::Text);
        assert_eq!(msg.content.as_deref(), Some("hello"));
        assert!(msg.pic_url.is_none());
    }

    #[test]
    fn parses_plain_text_nodes() {
        let body = "<xml>\
            <ToUserName>gh_1</ToUserName>\
            <FromUserName>user_9</FromUserName>\
            <MsgType>text</MsgType>\
            <Content>hi &amp; bye</Content>\
            </xml>";

        let msg = InboundMessage::parse(body).unwrap();
        assert_eq!(msg.content.as_deref(), Some("hi & bye"));
    }

    #[test]
    fn parses_image_message() {
        let body = "<xml>\
            <ToUserName><![CDATA[gh_1]]></ToUserName>\
            <FromUserName><![CDATA[user_9]]></FromUserName>\
            <MsgType><![CDATA[image]]></MsgType>\
            <PicUrl><![CDATA[http://x/y.jpg]]></PicUrl>\
            </xml>";

        let msg = InboundMessage::parse(body).unwrap();
        assert_eq!(msg.kind, MsgKind::Image);
        assert_eq!(msg.pic_url.as_deref(), Some("http://x/y.jpg"));
        assert!(msg.content.is_none());
    }

    #[test]
    fn preserves_unknown_kind() {
        let body = "<xml>\
            <ToUserName><![CDATA[gh_1]]></ToUserName>\
            <FromUserName><![CDATA[user_9]]></FromUserName>\
            <MsgType><![CDATA[voice]]></MsgType>\
            </xml>";

        let msg = InboundMessage::parse(body).unwrap();
        assert_eq!(msg.kind, MsgKind::Other("voice".into()));
        assert_eq!(msg.kind.as_str(), "voice");
    }

    #[test]
    fn empty_content_element_is_absent() {
        let body = "<xml>\
            <ToUserName>gh_1</ToUserName>\
            <FromUserName>user_9</FromUserName>\
            <MsgType>text</MsgType>\
            <Content></Content>\
            </xml>";

        let msg = InboundMessage::parse(body).unwrap();
        assert!(msg.content.is_none());
    }

    #[test]
    fn missing_msg_type_salvages_addressing() {
        let body = "<xml>\
            <ToUserName><![CDATA[gh_1]]></ToUserName>\
            <FromUserName><![CDATA[user_9]]></FromUserName>\
            </xml>";

        let err = InboundMessage::parse(body).unwrap_err();
        assert!(err.reason.contains("MsgType"));
        assert_eq!(err.to_user_name.as_deref(), Some("gh_1"));
        assert_eq!(err.from_user_name.as_deref(), Some("user_9"));
    }

    #[test]
    fn non_xml_body_is_malformed_without_salvage() {
        let err = InboundMessage::parse("this is not xml at all").unwrap_err();
        assert!(err.to_user_name.is_none());
        assert!(err.from_user_name.is_none());
    }

    #[test]
    fn wrong_root_element_is_malformed() {
        let err = InboundMessage::parse("<html><body>hi</body></html>").unwrap_err();
        assert!(err.reason.contains("root"));
    }

    #[test]
    fn truncated_document_salvages_earlier_fields() {
        let body = "<xml>\
            <ToUserName><![CDATA[gh_1]]></ToUserName>\
            <FromUserName><![CDATA[user";

        let err = InboundMessage::parse(body).unwrap_err();
        assert_eq!(err.to_user_name.as_deref(), Some("gh_1"));
    }

    #[test]
    fn split_cdata_sections_concatenate() {
        let body = "<xml>\
            <ToUserName>gh_1</ToUserName>\
            <FromUserName>user_9</FromUserName>\
            <MsgType>text</MsgType>\
            <Content><![CDATA[a]]]]><![CDATA[>b]]></Content>\
            </xml>";

        let msg = InboundMessage::parse(body).unwrap();
        assert_eq!(msg.content.as_deref(), Some("a]]>b"));
    }
}
