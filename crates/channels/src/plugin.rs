use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    magpie_common::types::{ChatType, ReplyPayload},
};

// ── Channel events (pub/sub) ────────────────────────────────────────────────

/// Events emitted by channel plugins for real-time UI updates and telemetry.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    InboundMessage {
        channel_type: String,
        account_id: String,
        peer_id: String,
        chat_id: String,
        chat_type: ChatType,
        access_granted: bool,
        /// Rejection reason when `access_granted` is false.
        reason: Option<String>,
    },
    /// A pairing code was issued to an unknown DM sender.
    PairingRequested {
        channel_type: String,
        account_id: String,
        peer_id: String,
        code: String,
    },
    /// A channel account was automatically disabled due to a runtime error.
    AccountDisabled {
        channel_type: String,
        account_id: String,
        reason: String,
    },
}

/// Sink for channel events — the gateway provides the concrete implementation.
#[async_trait]
pub trait ChannelEventSink: Send + Sync {
    /// Broadcast a channel event.
    async fn emit(&self, event: ChannelEvent);
}

// ── Routing context & reply dispatch ────────────────────────────────────────

/// Canonical, channel-agnostic representation of one authorized inbound
/// message, handed to the reply dispatcher once every gate has passed.
///
/// Constructed exactly once per accepted event and dropped after dispatch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutingContext {
    /// Channel tag (e.g. "lark").
    pub channel: String,
    pub account_id: String,
    /// Logical session this message routes to.
    pub session_key: String,
    pub agent_id: String,
    pub chat_type: ChatType,
    /// Conversation the reply must be addressed to (group id or sender id).
    pub chat_id: String,
    /// Channel-qualified sender identifier (e.g. "lark:ou_abc").
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Envelope body: human-readable header plus the raw text.
    pub body: String,
    /// Raw, unformatted text — carried separately for command parsing.
    pub raw_body: String,
    /// Effective mention flag after bypass resolution (groups only).
    pub was_mentioned: bool,
    /// Whether the sender may issue control commands; `None` when command
    /// authorization was not applicable for this event.
    pub command_authorized: Option<bool>,
    /// Platform message id of the inbound message.
    pub message_id: String,
    /// Thread pointer for reply addressing; the root id is preferred over a
    /// direct parent id.
    pub reply_thread_id: Option<String>,
    /// Per-group system-prompt override, when the matched group entry has one.
    pub system_prompt: Option<String>,
    /// Unix seconds of the session's previous activity, when known.
    pub previous_activity_at: Option<i64>,
}

/// Delivery callback a channel hands to the dispatcher along with the
/// context. The channel's implementation addresses the reply back to the
/// original conversation and must silently no-op on blank payloads.
#[async_trait]
pub trait ReplyDelivery: Send + Sync {
    async fn deliver(&self, payload: &ReplyPayload) -> Result<()>;

    /// Called by the dispatcher when reply production itself fails; purely
    /// informational, implementations log and move on.
    fn on_error(&self, error: &anyhow::Error, info: &str);
}

/// Reply dispatcher boundary — owns buffering and flush timing. The channel
/// core's responsibility ends at invoking this with a fully-formed context;
/// the dispatcher calls back into `delivery` when reply text is ready.
#[async_trait]
pub trait ReplyDispatcher: Send + Sync {
    async fn dispatch(&self, ctx: RoutingContext, delivery: Arc<dyn ReplyDelivery>) -> Result<()>;
}

// ── Plugin lifecycle ────────────────────────────────────────────────────────

/// Core channel plugin trait. Each messaging platform implements this.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Channel identifier (e.g. "lark").
    fn id(&self) -> &str;

    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start an account connection. Configuration errors are fatal for this
    /// account's connection attempt but must not take down the host.
    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()>;

    /// Stop an account connection.
    async fn stop_account(&mut self, account_id: &str) -> Result<()>;

    /// Get outbound adapter for sending messages.
    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    /// Get status adapter for health checks.
    fn status(&self) -> Option<&dyn ChannelStatus>;
}

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<()>;
}

/// Probe channel account health.
#[async_trait]
pub trait ChannelStatus: Send + Sync {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot>;
}

/// Channel health snapshot.
#[derive(Debug, Clone)]
pub struct ChannelHealthSnapshot {
    pub connected: bool,
    pub account_id: String,
    pub details: Option<String>,
}
