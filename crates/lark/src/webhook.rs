//! Outbound webhook forwarder.
//!
//! A stateless sibling to the channel plugin: it mirrors agent replies to a
//! Lark custom-bot webhook. Custom bots sign with HMAC-SHA256 using
//! `"{unixTimestampSeconds}\n{secret}"` as the key material over an empty
//! message body, base64-encoded.

use {
    anyhow::{anyhow, Context, Result},
    base64::{engine::general_purpose::STANDARD as BASE64, Engine},
    hmac::{Hmac, Mac},
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::json,
    sha2::Sha256,
    tracing::debug,
};

type HmacSha256 = Hmac<Sha256>;

/// One reply to mirror, as produced by the gateway's outbound hook.
#[derive(Debug, Clone)]
pub struct OutboundNotification<'a> {
    pub text: &'a str,
    pub session_key: &'a str,
    pub session_channel: &'a str,
}

#[derive(Clone, Deserialize)]
pub struct WebhookForwarderConfig {
    /// Custom-bot webhook URL.
    pub url: String,
    /// Only notifications from this channel tag are forwarded.
    pub channel: String,
    /// Optional keyword prefix, for webhooks configured with keyword
    /// filtering instead of (or alongside) signing.
    #[serde(default)]
    pub keyword: Option<String>,
    /// Signing secret; omitted for unsigned webhooks.
    #[serde(default)]
    pub secret: Option<Secret<String>>,
}

impl std::fmt::Debug for WebhookForwarderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookForwarderConfig")
            .field("url", &self.url)
            .field("channel", &self.channel)
            .field("keyword", &self.keyword)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

pub struct WebhookForwarder {
    http: reqwest::Client,
    config: WebhookForwarderConfig,
}

impl WebhookForwarder {
    #[must_use]
    pub fn new(config: WebhookForwarderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Forward one notification. Returns false when the notification was
    /// filtered out by channel tag (not an error).
    pub async fn forward(&self, notification: &OutboundNotification<'_>) -> Result<bool> {
        if notification.session_channel != self.config.channel {
            debug!(
                session_key = notification.session_key,
                channel = notification.session_channel,
                "webhook forwarder: channel filtered"
            );
            return Ok(false);
        }

        let text = match &self.config.keyword {
            Some(keyword) => format!("{keyword} {}", notification.text),
            None => notification.text.to_string(),
        };

        let timestamp = chrono::Utc::now().timestamp();
        let mut payload = json!({
            "msg_type": "text",
            "content": { "text": text },
        });
        if let Some(secret) = &self.config.secret {
            payload["timestamp"] = json!(timestamp.to_string());
            payload["sign"] = json!(sign(timestamp, secret.expose_secret())?);
        }

        let response = self
            .http
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("webhook returned http {status}"));
        }

        let body: WebhookResponse = response
            .json()
            .await
            .context("webhook response was not json")?;
        if body.code != 0 {
            return Err(anyhow!("webhook rejected message: {} {}", body.code, body.msg));
        }
        Ok(true)
    }
}

/// Custom-bot signature: the timestamp/secret pair is the HMAC *key* and the
/// signed message is empty.
fn sign(timestamp: i64, secret: &str) -> Result<String> {
    let key = format!("{timestamp}\n{secret}");
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|_| anyhow!("invalid webhook signing key"))?;
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, secret: Option<&str>) -> WebhookForwarderConfig {
        WebhookForwarderConfig {
            url: url.to_string(),
            channel: "lark".to_string(),
            keyword: None,
            secret: secret.map(|s| Secret::new(s.to_string())),
        }
    }

    #[test]
    fn signature_shape_and_determinism() {
        let a = sign(1_700_000_000, "s3cr3t").expect("sign");
        let b = sign(1_700_000_000, "s3cr3t").expect("sign");
        assert_eq!(a, b);

        // Base64 of a 32-byte SHA-256 digest.
        let raw = BASE64.decode(&a).expect("valid base64");
        assert_eq!(raw.len(), 32);

        // Key material includes the timestamp, so the signature rotates.
        let later = sign(1_700_000_001, "s3cr3t").expect("sign");
        assert_ne!(a, later);
    }

    #[tokio::test]
    async fn filters_other_channels_without_a_request() {
        // URL points nowhere; a filtered notification must never hit it.
        let forwarder = WebhookForwarder::new(config("http://127.0.0.1:1/hook", None));
        let sent = forwarder
            .forward(&OutboundNotification {
                text: "hi",
                session_key: "telegram:acct:direct:1",
                session_channel: "telegram",
            })
            .await
            .expect("filtered is not an error");
        assert!(!sent);
    }

    #[tokio::test]
    async fn posts_signed_payload() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex(r#""sign":""#.to_string()),
                mockito::Matcher::Regex(r#""timestamp":""#.to_string()),
                mockito::Matcher::Regex("alert: build done".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"code":0,"msg":"success"}"#)
            .create_async()
            .await;

        let mut cfg = config(&format!("{}/hook", server.url()), Some("s3cr3t"));
        cfg.keyword = Some("alert:".to_string());
        let sent = WebhookForwarder::new(cfg)
            .forward(&OutboundNotification {
                text: "build done",
                session_key: "lark:acct:group:oc_1",
                session_channel: "lark",
            })
            .await
            .expect("forward");
        assert!(sent);
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn application_level_rejection_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(200)
            .with_body(r#"{"code":19021,"msg":"sign match fail"}"#)
            .create_async()
            .await;

        let err = WebhookForwarder::new(config(&format!("{}/hook", server.url()), None))
            .forward(&OutboundNotification {
                text: "x",
                session_key: "lark:a:direct:u",
                session_channel: "lark",
            })
            .await
            .expect_err("non-zero code must fail");
        assert!(err.to_string().contains("19021"));
    }

    #[tokio::test]
    async fn http_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let result = WebhookForwarder::new(config(&format!("{}/hook", server.url()), None))
            .forward(&OutboundNotification {
                text: "x",
                session_key: "lark:a:direct:u",
                session_channel: "lark",
            })
            .await;
        assert!(result.is_err());
    }
}
