//! Routing-context assembly for events that passed every gate.

use std::sync::Arc;

use {
    magpie_channels::{
        plugin::RoutingContext,
        session::{InboundSessionMeta, Peer, SessionRouter},
    },
    magpie_common::types::ChatType,
    tracing::warn,
};

use crate::{event::InboundEvent, CHANNEL};

/// Show the "time since last activity" marker only when the gap is at least
/// this long.
const ELAPSED_MARKER_MIN_SECS: i64 = 300;

/// Flags the gates produced, folded into the context.
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    pub was_mentioned: bool,
    pub command_authorized: Option<bool>,
    pub system_prompt: Option<String>,
}

/// Assemble the canonical routing context and kick off session bookkeeping.
///
/// The inbound-metadata write is detached from the reply path: it runs as its
/// own task and its failure is logged, never propagated.
pub async fn build_context(
    router: &Arc<dyn SessionRouter>,
    account_id: &str,
    event: &InboundEvent,
    gates: GateOutcome,
    now: i64,
) -> RoutingContext {
    let peer = match event.chat_type {
        ChatType::Group => Peer::group(&event.chat_id),
        ChatType::Direct => Peer::direct(&event.sender_id),
    };
    let route = router.resolve_route(CHANNEL, account_id, &peer);
    let previous_activity_at = router.session_updated_at(&route.session_key).await;

    let body = format_envelope(event, now, previous_activity_at);

    {
        let router = Arc::clone(router);
        let session_key = route.session_key.clone();
        let meta = InboundSessionMeta {
            channel: CHANNEL.to_string(),
            sender_id: event.sender_id.clone(),
            sender_name: None,
            message_id: event.message_id.clone(),
            received_at: now,
        };
        tokio::spawn(async move {
            if let Err(error) = router.record_inbound_meta(&session_key, meta).await {
                warn!(session_key, %error, "failed to record inbound session metadata");
            }
        });
    }

    RoutingContext {
        channel: CHANNEL.to_string(),
        account_id: account_id.to_string(),
        session_key: route.session_key,
        agent_id: route.agent_id,
        chat_type: event.chat_type,
        chat_id: event.chat_id.clone(),
        sender_id: format!("{CHANNEL}:{}", event.sender_id),
        sender_name: None,
        body,
        raw_body: event.text.clone(),
        was_mentioned: gates.was_mentioned,
        command_authorized: gates.command_authorized,
        message_id: event.message_id.clone(),
        reply_thread_id: event.reply_thread_id().map(str::to_string),
        system_prompt: gates.system_prompt,
        previous_activity_at,
    }
}

/// Human-readable envelope: conversation header, optional elapsed-time
/// marker, then the raw text.
fn format_envelope(event: &InboundEvent, now: i64, previous_activity_at: Option<i64>) -> String {
    let location = match event.chat_type {
        ChatType::Group => event.chat_name.as_deref().unwrap_or(&event.chat_id),
        ChatType::Direct => "DM",
    };
    let mut out = format!("[lark {location}] {}: ", event.sender_id);

    if let Some(previous) = previous_activity_at {
        let gap = now - previous;
        if gap >= ELAPSED_MARKER_MIN_SECS {
            out.push_str(&format!("[{} since last activity] ", format_elapsed(gap)));
        }
    }

    out.push_str(&event.text);
    out
}

fn format_elapsed(seconds: i64) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    if seconds >= DAY {
        format!("{}d", seconds / DAY)
    } else if seconds >= HOUR {
        format!("{}h", seconds / HOUR)
    } else {
        format!("{}m", seconds / MINUTE)
    }
}
