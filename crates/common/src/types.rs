use serde::{Deserialize, Serialize};

/// Conversation class an inbound message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-on-one conversation with the bot.
    Direct,
    /// Multi-member group conversation.
    Group,
}

impl ChatType {
    #[must_use]
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group)
    }

    /// Stable string tag used in session keys and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// Who sent an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Human,
    Bot,
}

/// Outbound reply content handed to a channel's delivery callback.
///
/// Kept deliberately flat: the agent layer produces plain text, channels
/// decide how to render it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub text: String,
}

impl ReplyPayload {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// True when there is nothing worth delivering.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
