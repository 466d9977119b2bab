//! Inbound authorization pipeline.
//!
//! Gate ordering, per event:
//!
//! 1. bot filter — messages from other bots are dropped unless `allow_bots`
//! 2. mention extraction (pure, used later by the mention gate)
//! 3. group gate — policy plus per-group overrides
//! 4. command authorization — computed once, reused by the mention gate
//! 5. DM gate — policy plus pairing handshake for unknown senders
//! 6. mention gate — requirement, detectability, command bypass
//! 7. context build, event emission, dispatcher handoff
//!
//! Policy rejections produce no reply (at most one pairing-code message);
//! the sender is simply not answered.

use std::sync::Arc;

use {
    async_trait::async_trait,
    magpie_channels::{
        gating::DmPolicy,
        plugin::{ChannelEvent, ChannelEventSink, ReplyDispatcher},
        session::SessionRouter,
        store::PairingStore,
    },
    magpie_common::types::SenderKind,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    access::{self, DmDecision, Rejection},
    context::{self, GateOutcome},
    event::{parse_event, InboundEvent},
    mention,
    outbound::LarkReplyDelivery,
    pairing,
    state::LarkState,
    transport::EventHandler,
    CHANNEL,
};

/// One account's event pipeline. Registered as the handler on that account's
/// live connection.
pub struct EventPipeline {
    account_id: String,
    state: LarkState,
    store: Arc<dyn PairingStore>,
    router: Arc<dyn SessionRouter>,
    sink: Arc<dyn ChannelEventSink>,
    dispatcher: Arc<dyn ReplyDispatcher>,
}

impl EventPipeline {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        state: LarkState,
        store: Arc<dyn PairingStore>,
        router: Arc<dyn SessionRouter>,
        sink: Arc<dyn ChannelEventSink>,
        dispatcher: Arc<dyn ReplyDispatcher>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            state,
            store,
            router,
            sink,
            dispatcher,
        }
    }

    async fn process(&self, event: InboundEvent) -> anyhow::Result<()> {
        let Some(runtime) = self.state.get(&self.account_id) else {
            debug!(account_id = %self.account_id, "event for account that is not running");
            return Ok(());
        };
        let config = Arc::clone(&runtime.config);

        if event.sender_kind == SenderKind::Bot && !config.allow_bots {
            debug!(chat_id = %event.chat_id, "ignoring message from another bot");
            return Ok(());
        }

        let mention = mention::extract(&event.mentions, &event.text, &runtime.bot);
        let is_group = event.chat_type.is_group();

        let entry = if is_group {
            match access::evaluate_group(
                &config,
                &event.chat_id,
                event.chat_name.as_deref(),
                &event.sender_id,
            ) {
                Ok(entry) => entry,
                Err(rejection) => {
                    self.reject(&event, &rejection).await;
                    return Ok(());
                },
            }
        } else {
            None
        };

        let command_present =
            config.allow_text_commands && access::has_control_command(&event.text);

        // The pairing-store allow-list is only consulted when a DM policy or
        // a DM command check actually needs it.
        let needs_store = !is_group
            && (matches!(config.dm_policy, DmPolicy::Pairing | DmPolicy::Allowlist)
                || (command_present && config.use_access_groups));
        let store_allow = if needs_store {
            match self.store.read_allow_from(CHANNEL).await {
                Ok(list) => list,
                Err(error) => {
                    warn!(%error, "pairing store read failed; treating allow-list as empty");
                    Vec::new()
                },
            }
        } else {
            Vec::new()
        };

        let command_authorized = if command_present {
            Some(access::resolve_command_authorized(
                &event.sender_id,
                is_group,
                entry.map(|e| e.users.as_slice()),
                &config.allowlist,
                &store_allow,
                config.use_access_groups,
            ))
        } else {
            None
        };

        if !is_group {
            let mut merged = config.allowlist.clone();
            merged.extend(store_allow.iter().cloned());
            match access::evaluate_direct(config.dm_policy, &event.sender_id, &merged) {
                DmDecision::Allow => {},
                DmDecision::Deny { needs_pairing } => {
                    if needs_pairing {
                        if let Err(error) = pairing::begin_pairing(
                            self.store.as_ref(),
                            &runtime.client,
                            self.sink.as_ref(),
                            &self.account_id,
                            &event.sender_id,
                            &event.chat_id,
                        )
                        .await
                        {
                            warn!(sender_id = %event.sender_id, %error, "pairing handshake failed");
                        }
                    }
                    let rejection = if config.dm_policy == DmPolicy::Disabled {
                        Rejection::DmsDisabled
                    } else {
                        Rejection::DmSenderNotAllowed
                    };
                    self.reject(&event, &rejection).await;
                    return Ok(());
                },
            }
        }

        let mut was_mentioned = mention.was_mentioned;
        if is_group {
            let require =
                entry.map_or(config.require_mention, |e| e.requires_mention(config.require_mention));
            let gate = access::resolve_mention_gate(
                require,
                &mention,
                command_authorized == Some(true),
                config.mention_fail_open,
            );
            if gate.should_skip {
                self.reject(&event, &Rejection::NotMentioned).await;
                return Ok(());
            }
            was_mentioned = gate.effective_was_mentioned;
        }

        let now = chrono::Utc::now().timestamp();
        let ctx = context::build_context(
            &self.router,
            &self.account_id,
            &event,
            GateOutcome {
                was_mentioned,
                command_authorized,
                system_prompt: entry.and_then(|e| e.system_prompt.clone()),
            },
            now,
        )
        .await;

        self.sink
            .emit(ChannelEvent::InboundMessage {
                channel_type: CHANNEL.to_string(),
                account_id: self.account_id.clone(),
                peer_id: event.sender_id.clone(),
                chat_id: event.chat_id.clone(),
                chat_type: event.chat_type,
                access_granted: true,
                reason: None,
            })
            .await;

        let delivery = Arc::new(LarkReplyDelivery::new(
            Arc::clone(&runtime.client),
            event.chat_id.clone(),
            ctx.reply_thread_id.clone(),
        ));
        let session_key = ctx.session_key.clone();
        match self.dispatcher.dispatch(ctx, delivery).await {
            Ok(()) => {
                self.router
                    .record_outbound_at(&session_key, chrono::Utc::now().timestamp())
                    .await;
            },
            Err(error) => {
                warn!(session_key, %error, "reply dispatch failed");
            },
        }
        Ok(())
    }

    async fn reject(&self, event: &InboundEvent, rejection: &Rejection) {
        info!(
            chat_id = %event.chat_id,
            sender_id = %event.sender_id,
            %rejection,
            "inbound message rejected"
        );
        self.sink
            .emit(ChannelEvent::InboundMessage {
                channel_type: CHANNEL.to_string(),
                account_id: self.account_id.clone(),
                peer_id: event.sender_id.clone(),
                chat_id: event.chat_id.clone(),
                chat_type: event.chat_type,
                access_granted: false,
                reason: Some(rejection.to_string()),
            })
            .await;
    }
}

#[async_trait]
impl EventHandler for EventPipeline {
    async fn handle_event(&self, raw: Value) {
        // Malformed payloads are routine on live connections; drop silently.
        let Some(event) = parse_event(&raw) else {
            return;
        };
        if let Err(error) = self.process(event).await {
            warn!(account_id = %self.account_id, %error, "event pipeline failed");
        }
    }
}
