//! Typed inbound events.
//!
//! Raw `im.message.receive_v1` payloads are validated exactly once at the
//! connection boundary; everything downstream operates on [`InboundEvent`].
//! Malformed payloads are expected on noisy live connections and are dropped
//! without logging.

use {
    magpie_common::types::{ChatType, SenderKind},
    serde_json::Value,
};

/// Event type this channel subscribes to on the live connection.
pub const MESSAGE_RECEIVE_EVENT: &str = "im.message.receive_v1";

/// One structured mention from the platform payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionEntry {
    /// Placeholder key embedded in the text body (e.g. `@_user_1`).
    pub key: String,
    pub open_id: Option<String>,
    pub user_id: Option<String>,
    pub name: Option<String>,
}

/// Immutable snapshot of one platform message.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub message_id: String,
    pub chat_id: String,
    pub chat_type: ChatType,
    /// Group name when the transport supplies one; Lark message events
    /// usually do not carry it.
    pub chat_name: Option<String>,
    /// Sender open id.
    pub sender_id: String,
    pub sender_kind: SenderKind,
    /// Plain text body with platform escapes preserved.
    pub text: String,
    pub mentions: Vec<MentionEntry>,
    pub root_id: Option<String>,
    pub parent_id: Option<String>,
    /// Server timestamp, unix seconds.
    pub created_at: i64,
}

impl InboundEvent {
    /// Thread pointer for reply addressing, preferring the root id.
    #[must_use]
    pub fn reply_thread_id(&self) -> Option<&str> {
        self.root_id.as_deref().or(self.parent_id.as_deref())
    }
}

/// Parse a raw event callback into a typed [`InboundEvent`].
///
/// Returns `None` for anything that cannot enter the pipeline: wrong event
/// type, missing conversation/sender ids, unsupported message types, or a
/// body that is empty after trimming.
pub fn parse_event(raw: &Value) -> Option<InboundEvent> {
    let event_type = raw
        .pointer("/header/event_type")
        .and_then(Value::as_str)?;
    if event_type != MESSAGE_RECEIVE_EVENT {
        return None;
    }

    let message = raw.pointer("/event/message")?;
    let sender = raw.pointer("/event/sender")?;

    let message_id = non_empty_str(message.get("message_id"))?;
    let chat_id = non_empty_str(message.get("chat_id"))?;
    let chat_type = match message.get("chat_type").and_then(Value::as_str)? {
        "p2p" => ChatType::Direct,
        "group" => ChatType::Group,
        _ => return None,
    };

    let sender_id = non_empty_str(sender.pointer("/sender_id/open_id"))?;
    let sender_kind = match sender.get("sender_type").and_then(Value::as_str) {
        Some("user") => SenderKind::Human,
        _ => SenderKind::Bot,
    };

    let message_type = message.get("message_type").and_then(Value::as_str)?;
    let content = message.get("content").and_then(Value::as_str)?;
    let text = extract_text(message_type, content)?;
    if text.trim().is_empty() {
        return None;
    }

    let mentions = message
        .get("mentions")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(parse_mention).collect())
        .unwrap_or_default();

    Some(InboundEvent {
        message_id,
        chat_id,
        chat_type,
        chat_name: non_empty_str(raw.pointer("/event/message/chat_name")),
        sender_id,
        sender_kind,
        text,
        mentions,
        root_id: non_empty_str(message.get("root_id")),
        parent_id: non_empty_str(message.get("parent_id")),
        created_at: epoch_seconds(message.get("create_time")),
    })
}

fn parse_mention(value: &Value) -> Option<MentionEntry> {
    let key = non_empty_str(value.get("key"))?;
    Some(MentionEntry {
        key,
        open_id: non_empty_str(value.pointer("/id/open_id")),
        user_id: non_empty_str(value.pointer("/id/user_id")),
        name: non_empty_str(value.get("name")),
    })
}

/// Extract a text body from the JSON-encoded `content` field.
///
/// `text` messages carry `{"text": "..."}`. `post` (rich text) messages carry
/// nested paragraph runs; text runs are concatenated and `at` runs are
/// rendered in the platform's inline escape form so mention detection still
/// works on rich bodies. Everything else (images, files, stickers) has no
/// text to route and is dropped.
fn extract_text(message_type: &str, content: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(content).ok()?;
    match message_type {
        "text" => parsed.get("text").and_then(Value::as_str).map(str::to_string),
        "post" => {
            let mut out = String::new();
            let paragraphs = parsed
                .get("content")
                .or_else(|| parsed.pointer("/zh_cn/content"))
                .and_then(Value::as_array)?;
            for (i, paragraph) in paragraphs.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                let Some(runs) = paragraph.as_array() else {
                    continue;
                };
                for run in runs {
                    match run.get("tag").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(text) = run.get("text").and_then(Value::as_str) {
                                out.push_str(text);
                            }
                        },
                        Some("at") => {
                            if let Some(user_id) = run.get("user_id").and_then(Value::as_str) {
                                out.push_str(&format!("<at user_id=\"{user_id}\"></at>"));
                            }
                        },
                        _ => {},
                    }
                }
            }
            Some(out)
        },
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn epoch_seconds(value: Option<&Value>) -> i64 {
    // Lark sends `create_time` as a millisecond epoch encoded as a string.
    value
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<i64>().ok())
        .map(|ms| ms / 1000)
        .unwrap_or(0)
}
