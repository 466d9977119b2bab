//! DM pairing handshake for unknown senders.
//!
//! Under the `pairing` DM policy a sender who is not yet on the allow-list
//! receives a one-time numeric code and waits for operator approval. The
//! code reply is sent only the first time within the code's validity window;
//! repeat messages stay silent so an impatient sender cannot generate spam.

use {
    magpie_channels::{
        plugin::{ChannelEvent, ChannelEventSink},
        store::PairingStore,
    },
    tracing::{info, warn},
};

use crate::{client::LarkClient, CHANNEL};

/// Text sent to the sender alongside their pairing code. Carries the sender's
/// own identifier so the operator can match the approval to a person.
#[must_use]
pub fn pairing_instructions(sender_id: &str, code: &str) -> String {
    format!(
        "Pairing required. Give the bot operator your id and this code to get access.\n\
         Your id: {sender_id}\n\
         Code: {code}\n\
         The code expires in 1 hour."
    )
}

/// Run the pairing handshake for a denied DM sender: create or refresh the
/// pending request, send the code on first issue, and notify the host.
///
/// Send failures are logged but never propagated; the pairing request is
/// recorded either way and the sender can be approved out-of-band.
pub async fn begin_pairing(
    store: &dyn PairingStore,
    client: &LarkClient,
    sink: &dyn ChannelEventSink,
    account_id: &str,
    sender_id: &str,
    chat_id: &str,
) -> anyhow::Result<()> {
    let request = store.upsert_pairing_request(CHANNEL, sender_id).await?;
    if !request.created {
        return Ok(());
    }

    info!(sender_id, "issued pairing code to unknown DM sender");
    if let Err(error) = client
        .send_text(chat_id, &pairing_instructions(sender_id, &request.code), None)
        .await
    {
        warn!(sender_id, %error, "failed to deliver pairing code");
    }

    sink.emit(ChannelEvent::PairingRequested {
        channel_type: CHANNEL.to_string(),
        account_id: account_id.to_string(),
        peer_id: sender_id.to_string(),
        code: request.code,
    })
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        async_trait::async_trait,
        magpie_channels::store::MemoryPairingStore,
        secrecy::Secret,
    };

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ChannelEvent>>,
    }

    #[async_trait]
    impl ChannelEventSink for RecordingSink {
        async fn emit(&self, event: ChannelEvent) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event);
        }
    }

    fn offline_client() -> LarkClient {
        // Unroutable host; pairing must succeed even when the code reply
        // cannot be delivered.
        LarkClient::with_base_url("cli_t", Secret::new("s".into()), "http://127.0.0.1:1")
    }

    #[test]
    fn instructions_embed_sender_and_code() {
        let text = pairing_instructions("ou_new", "482913");
        assert!(text.contains("482913"));
        assert!(text.contains("ou_new"));
        assert!(text.contains("expires"));
    }

    #[tokio::test]
    async fn first_contact_emits_pairing_event() {
        let store = MemoryPairingStore::new();
        let sink = RecordingSink::default();

        begin_pairing(&store, &offline_client(), &sink, "acct", "ou_new", "ou_new")
            .await
            .expect("pairing");

        let events = sink.events.lock().expect("lock");
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChannelEvent::PairingRequested {
                channel_type,
                peer_id,
                code,
                ..
            } => {
                assert_eq!(channel_type, "lark");
                assert_eq!(peer_id, "ou_new");
                assert_eq!(code.len(), 6);
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeat_contact_is_silent() {
        let store = MemoryPairingStore::new();
        let sink = RecordingSink::default();
        let client = offline_client();

        begin_pairing(&store, &client, &sink, "acct", "ou_new", "ou_new")
            .await
            .expect("pairing");
        begin_pairing(&store, &client, &sink, "acct", "ou_new", "ou_new")
            .await
            .expect("pairing");

        let events = sink.events.lock().expect("lock");
        assert_eq!(events.len(), 1, "repeat request must not re-issue the code");
    }
}
