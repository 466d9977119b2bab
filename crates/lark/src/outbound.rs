//! Outbound message adapters.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    magpie_channels::plugin::{ChannelOutbound, ReplyDelivery},
    magpie_common::types::ReplyPayload,
    tracing::{debug, warn},
};

use crate::{client::LarkClient, state::LarkState};

/// Host-facing send adapter, addressing any running account.
pub struct LarkOutbound {
    state: LarkState,
}

impl LarkOutbound {
    #[must_use]
    pub fn new(state: LarkState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ChannelOutbound for LarkOutbound {
    async fn send_text(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<()> {
        let runtime = self
            .state
            .get(account_id)
            .ok_or_else(|| magpie_channels::Error::unknown_account(account_id))?;
        runtime.client.send_text(to, text, reply_to).await?;
        Ok(())
    }
}

/// Delivery callback handed to the dispatcher for one accepted event.
/// Addresses the reply back to the original conversation.
pub struct LarkReplyDelivery {
    client: Arc<LarkClient>,
    chat_id: String,
    reply_to: Option<String>,
}

impl LarkReplyDelivery {
    #[must_use]
    pub fn new(client: Arc<LarkClient>, chat_id: impl Into<String>, reply_to: Option<String>) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
            reply_to,
        }
    }
}

#[async_trait]
impl ReplyDelivery for LarkReplyDelivery {
    async fn deliver(&self, payload: &ReplyPayload) -> Result<()> {
        if payload.is_blank() {
            debug!(chat_id = %self.chat_id, "skipping blank reply payload");
            return Ok(());
        }
        self.client
            .send_text(&self.chat_id, &payload.text, self.reply_to.as_deref())
            .await?;
        Ok(())
    }

    fn on_error(&self, error: &anyhow::Error, info: &str) {
        warn!(chat_id = %self.chat_id, %error, info, "reply production failed");
    }
}

#[cfg(test)]
mod tests {
    use secrecy::Secret;

    use super::*;

    #[tokio::test]
    async fn unknown_account_errors() {
        let outbound = LarkOutbound::new(LarkState::new());
        let err = outbound
            .send_text("ghost", "oc_room", "hi", None)
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn blank_payloads_are_silently_dropped() {
        // Unroutable host: a blank payload must short-circuit before any
        // network call happens.
        let client = Arc::new(LarkClient::with_base_url(
            "cli_t",
            Secret::new("s".into()),
            "http://127.0.0.1:1",
        ));
        let delivery = LarkReplyDelivery::new(client, "oc_room", None);
        delivery
            .deliver(&ReplyPayload::text("   \n"))
            .await
            .expect("blank payload is a no-op");
    }

    #[tokio::test]
    async fn delivery_threads_replies() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v3/tenant_access_token/internal")
            .with_status(200)
            .with_body(r#"{"code":0,"tenant_access_token":"t","expire":7200}"#)
            .create_async()
            .await;
        let reply_mock = server
            .mock("POST", "/im/v1/messages/om_root/reply")
            .with_status(200)
            .with_body(r#"{"code":0,"data":{"message_id":"om_r"}}"#)
            .create_async()
            .await;

        let client = Arc::new(LarkClient::with_base_url(
            "cli_t",
            Secret::new("s".into()),
            server.url(),
        ));
        let delivery = LarkReplyDelivery::new(client, "oc_room", Some("om_root".into()));
        delivery
            .deliver(&ReplyPayload::text("done"))
            .await
            .expect("deliver");
        reply_mock.assert_async().await;
    }
}
